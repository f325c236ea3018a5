use serde_json::Value;
use tracing::{info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::{BenchError, Result};

/// Sign the session in through the application's login form. The session
/// cookie lands in the client's cookie store, so every later exchange is
/// authenticated.
pub async fn sign_in(
    dispatcher: &mut Dispatcher,
    base_url: &str,
    login_path: &str,
    username: &str,
    password: &str,
) -> Result<()> {
    let url = format!("{}/{}", base_url, login_path.trim_start_matches('/'));
    info!(%url, username, "signing in");

    let form = [
        ("signin[username]", username),
        ("signin[password]", password),
        ("signin[remember]", "on"),
    ];
    let exchange = dispatcher.post(&url, &form).await?;

    if exchange.status != 200 || exchange.content_type().is_none() {
        warn!(status = exchange.status, "sign-in request was rejected");
        return Err(BenchError::auth("couldn't execute signin action"));
    }

    let body = exchange
        .json_object()
        .filter(|body| body.contains_key("success"))
        .ok_or_else(|| BenchError::auth("login mechanism not supported"))?;

    if body.get("success").and_then(Value::as_bool) == Some(true) {
        info!(username, "signed in");
        return Ok(());
    }

    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("credentials were refused");
    Err(BenchError::auth(message))
}
