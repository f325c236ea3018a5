use std::fs;
use std::path::PathBuf;

use tracing::warn;

use crate::error::{BenchError, Result};
use crate::target::Target;

/// Yields the widget references a layout page is composed of.
pub trait LayoutReader: Send + Sync {
    fn read_components(&self, layout: &str) -> Result<Vec<Target>>;
}

/// Reads `<pages_dir>/<layout>.xml` and collects every `component` element
/// (whatever its namespace prefix) in document order.
#[derive(Debug, Clone)]
pub struct XmlLayoutReader {
    pages_dir: PathBuf,
}

impl XmlLayoutReader {
    pub fn new(pages_dir: impl Into<PathBuf>) -> Self {
        Self {
            pages_dir: pages_dir.into(),
        }
    }
}

impl LayoutReader for XmlLayoutReader {
    fn read_components(&self, layout: &str) -> Result<Vec<Target>> {
        let path = self.pages_dir.join(format!("{layout}.xml"));
        let text = fs::read_to_string(&path).map_err(|e| BenchError::io(&path, e))?;
        parse_components(layout, &text)
    }
}

pub fn parse_components(layout: &str, xml: &str) -> Result<Vec<Target>> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| BenchError::Layout {
        layout: layout.to_string(),
        message: e.to_string(),
    })?;

    let mut components = Vec::new();
    for node in doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "component")
    {
        match (node.attribute("module"), node.attribute("name")) {
            (Some(module), Some(name)) if !module.is_empty() && !name.is_empty() => {
                components.push(Target::new(module, name));
            }
            _ => warn!(
                layout,
                line = doc.text_pos_at(node.range().start).row,
                "component without module/name attributes, skipped"
            ),
        }
    }
    Ok(components)
}
