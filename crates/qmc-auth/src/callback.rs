use std::net::{Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::AuthConfig;
use crate::errors::{AuthError, Result};
use crate::pkce;

const MAX_REQUEST_BYTES: usize = 8192;
const READ_TIMEOUT: Duration = Duration::from_secs(5);

const SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html>
    <head><title>QuickMC - Login Complete</title></head>
    <body>
        <h1>Login Successful!</h1>
        <p>You can now close this window and return to QuickMC.</p>
        <script>setTimeout(() => window.close(), 2000);</script>
    </body>
</html>
"#;

const ERROR_HTML: &str = r#"<!DOCTYPE html>
<html>
    <head><title>QuickMC - Login Failed</title></head>
    <body>
        <h1>Login was not completed</h1>
        <p>You can close this window and try again from QuickMC.</p>
    </body>
</html>
"#;

/// Query parameters captured from the redirect
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    pub fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => params.code = Some(value.into_owned()),
                "state" => params.state = Some(value.into_owned()),
                "error" => params.error = Some(value.into_owned()),
                "error_description" => params.error_description = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    }

    /// Check the redirect against the attempt's state and extract the code
    pub fn into_code(self, expected_state: &str) -> Result<String> {
        if let Some(error) = self.error {
            if error == "access_denied" {
                return Err(AuthError::UserCancelled);
            }
            warn!(
                "Login page redirected with error {}: {}",
                error,
                self.error_description.as_deref().unwrap_or("no description")
            );
            return Err(AuthError::InvalidRedirect);
        }

        match self.state.as_deref() {
            Some(actual) if pkce::state_matches(expected_state, actual) => {}
            _ => return Err(AuthError::StateMismatch),
        }

        self.code
            .filter(|code| !code.is_empty())
            .ok_or(AuthError::InvalidRedirect)
    }
}

/// Single-shot local HTTP endpoint receiving the OAuth redirect
///
/// Serves exactly one request on its callback path, answers it with a
/// confirmation page and closes. Any other path gets a 404 and the listener
/// keeps waiting.
#[derive(Debug, Clone)]
pub struct LoopbackCallbackListener {
    addr: SocketAddr,
    path: String,
    /// Also accept on `[::1]` at the same port
    ipv6_loopback: bool,
}

impl LoopbackCallbackListener {
    pub fn new(addr: SocketAddr, path: impl Into<String>) -> Self {
        Self {
            addr,
            path: path.into(),
            ipv6_loopback: false,
        }
    }

    /// Listener bound where the configured redirect URI points
    ///
    /// A `localhost` redirect is served on both loopback families, since the
    /// browser may resolve it to either.
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let mut listener = Self::new(config.callback_addr()?, config.callback_path());
        listener.ipv6_loopback = config.redirect_uri.host_str() == Some("localhost");
        Ok(listener)
    }

    /// Bind the socket and start serving in a background task
    ///
    /// Takes `self` by value so an attempt can only start its listener once.
    pub async fn start(self) -> Result<CallbackHandle> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|source| AuthError::ListenerBind {
                addr: self.addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let ipv6 = if self.ipv6_loopback && local_addr.is_ipv4() {
            let addr = SocketAddr::new(Ipv6Addr::LOCALHOST.into(), local_addr.port());
            match TcpListener::bind(addr).await {
                Ok(listener) => Some(listener),
                Err(e) => {
                    debug!("IPv6 loopback unavailable for callback ({}): {}", addr, e);
                    None
                }
            }
        } else {
            None
        };

        let (code_tx, code_rx) = oneshot::channel();
        let task = tokio::spawn(serve(listener, ipv6, self.path, code_tx));

        info!("Login callback listener started on http://{}", local_addr);
        Ok(CallbackHandle {
            local_addr,
            code_rx,
            task,
        })
    }
}

/// Owner side of a running listener
///
/// Dropping the handle stops the listener.
#[derive(Debug)]
pub struct CallbackHandle {
    local_addr: SocketAddr,
    code_rx: oneshot::Receiver<CallbackParams>,
    task: JoinHandle<()>,
}

impl CallbackHandle {
    /// Address actually bound (differs from the requested one for port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the callback, at most `timeout`
    ///
    /// Returns once the listener task has fully shut down. `None` means no
    /// callback arrived in time.
    pub async fn wait(mut self, timeout: Duration) -> Option<CallbackParams> {
        let received = match tokio::time::timeout(timeout, &mut self.code_rx).await {
            Ok(Ok(params)) => Some(params),
            Ok(Err(_)) => {
                warn!("Login callback listener stopped without receiving a callback");
                None
            }
            Err(_) => {
                info!("No login callback within {:?}", timeout);
                None
            }
        };

        // The task exits by itself after a capture; otherwise stop it here
        if received.is_none() {
            self.task.abort();
        }
        if let Err(e) = (&mut self.task).await
            && !e.is_cancelled()
        {
            error!("Login callback listener task failed: {}", e);
        }

        received
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    listener: TcpListener,
    ipv6: Option<TcpListener>,
    path: String,
    code_tx: oneshot::Sender<CallbackParams>,
) {
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            accepted = accept_optional(ipv6.as_ref()) => accepted,
        };
        let (stream, peer) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("Login callback listener accept failed: {}", e);
                return;
            }
        };

        match handle_connection(stream, &path).await {
            Ok(Some(params)) => {
                debug!("Captured login callback from {}", peer);
                let _ = code_tx.send(params);
                break;
            }
            Ok(None) => {}
            Err(e) => debug!("Dropped callback connection from {}: {}", peer, e),
        }
    }

    debug!("Login callback listener shut down");
}

async fn accept_optional(
    listener: Option<&TcpListener>,
) -> std::io::Result<(TcpStream, SocketAddr)> {
    match listener {
        Some(listener) => listener.accept().await,
        None => std::future::pending().await,
    }
}

/// Serve one connection; `Some` when it was the callback request
async fn handle_connection(
    mut stream: TcpStream,
    callback_path: &str,
) -> std::io::Result<Option<CallbackParams>> {
    let request = tokio::time::timeout(READ_TIMEOUT, read_request_head(&mut stream))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "request read timed out"))??;

    let Some(target) = request_target(&request) else {
        write_response(&mut stream, "400 Bad Request", "Bad request").await?;
        return Ok(None);
    };

    let url = match Url::parse("http://localhost").and_then(|base| base.join(target)) {
        Ok(url) if url.path() == callback_path => url,
        _ => {
            write_response(&mut stream, "404 Not Found", "Not found").await?;
            return Ok(None);
        }
    };

    let params = CallbackParams::from_url(&url);
    let (status, page) = if params.error.is_some() || params.code.is_none() {
        ("400 Bad Request", ERROR_HTML)
    } else {
        ("200 OK", SUCCESS_HTML)
    };

    // The code is already captured; a browser that went away early is fine
    if let Err(e) = write_response(&mut stream, status, page).await {
        debug!("Could not deliver confirmation page: {}", e);
    }

    Ok(Some(params))
}

async fn read_request_head(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if buffer.windows(4).any(|w| w == b"\r\n\r\n") || buffer.len() >= MAX_REQUEST_BYTES {
            break;
        }
    }

    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Target of a `GET` request line
fn request_target(request: &str) -> Option<&str> {
    let mut parts = request.lines().next()?.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("GET"), Some(target)) if target.starts_with('/') => Some(target),
        _ => None,
    }
}

async fn write_response(stream: &mut TcpStream, status: &str, body: &str) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn start_listener() -> CallbackHandle {
        LoopbackCallbackListener::new("127.0.0.1:0".parse().unwrap(), "/completeLogin")
            .start()
            .await
            .unwrap()
    }

    fn callback_url(addr: SocketAddr, query: &str) -> String {
        format!("http://{addr}/completeLogin?{query}")
    }

    #[test]
    fn test_into_code() {
        let url = Url::parse("http://localhost:8000/completeLogin?code=M.abc&state=xyz").unwrap();
        let params = CallbackParams::from_url(&url);
        assert_eq!(params.clone().into_code("xyz").unwrap(), "M.abc");
        assert!(matches!(
            params.into_code("other"),
            Err(AuthError::StateMismatch)
        ));

        let url = Url::parse("http://localhost:8000/completeLogin?error=access_denied&state=xyz")
            .unwrap();
        assert!(matches!(
            CallbackParams::from_url(&url).into_code("xyz"),
            Err(AuthError::UserCancelled)
        ));

        let url = Url::parse("http://localhost:8000/completeLogin?state=xyz").unwrap();
        assert!(matches!(
            CallbackParams::from_url(&url).into_code("xyz"),
            Err(AuthError::InvalidRedirect)
        ));
    }

    #[test]
    fn test_request_target() {
        assert_eq!(
            request_target("GET /completeLogin?code=1 HTTP/1.1\r\nHost: x\r\n\r\n"),
            Some("/completeLogin?code=1")
        );
        assert_eq!(request_target("POST /completeLogin HTTP/1.1\r\n\r\n"), None);
        assert_eq!(request_target(""), None);
    }

    #[tokio::test]
    async fn test_captures_code_and_shuts_down() {
        let handle = start_listener().await;
        let addr = handle.local_addr();

        let response = reqwest::get(callback_url(addr, "code=M.abc&state=s1"))
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert!(response.text().await.unwrap().contains("Login Successful"));

        let params = handle.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(params.code.as_deref(), Some("M.abc"));
        assert_eq!(params.state.as_deref(), Some("s1"));

        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_other_paths_do_not_end_the_attempt() {
        let handle = start_listener().await;
        let addr = handle.local_addr();

        let response = reqwest::get(format!("http://{addr}/favicon.ico")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

        reqwest::get(callback_url(addr, "code=after-favicon&state=s"))
            .await
            .unwrap();

        let params = handle.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(params.code.as_deref(), Some("after-favicon"));
    }

    #[tokio::test]
    async fn test_concurrent_requests_capture_exactly_one_code() {
        let handle = start_listener().await;
        let addr = handle.local_addr();

        let first = tokio::spawn(async move {
            reqwest::Client::new()
                .get(callback_url(addr, "code=first&state=s"))
                .send()
                .await
                .map(|r| r.status())
        });
        let second = tokio::spawn(async move {
            reqwest::Client::new()
                .get(callback_url(addr, "code=second&state=s"))
                .send()
                .await
                .map(|r| r.status())
        });

        let params = handle.wait(Duration::from_secs(5)).await.unwrap();
        let first = first.await.unwrap();
        let second = second.await.unwrap();

        let served: Vec<&str> = [("first", &first), ("second", &second)]
            .into_iter()
            .filter(|(_, result)| matches!(result, Ok(status) if status.is_success()))
            .map(|(code, _)| code)
            .collect();
        assert_eq!(served.len(), 1);
        assert_eq!(params.code.as_deref(), Some(served[0]));

        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_timeout_releases_the_port() {
        let handle = start_listener().await;
        let addr = handle.local_addr();

        assert!(handle.wait(Duration::from_millis(100)).await.is_none());
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_error_redirect_is_captured() {
        let handle = start_listener().await;
        let addr = handle.local_addr();

        let response = reqwest::get(callback_url(addr, "error=access_denied&state=s"))
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

        let params = handle.wait(Duration::from_secs(5)).await.unwrap();
        assert!(matches!(params.into_code("s"), Err(AuthError::UserCancelled)));
    }

    #[tokio::test]
    async fn test_localhost_redirect_accepts_ipv6_loopback() {
        // Hosts without IPv6 loopback have nothing to test here
        let Ok(probe_v6) = TcpListener::bind("[::1]:0").await else {
            return;
        };
        drop(probe_v6);

        let port = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = AuthConfig {
            redirect_uri: Url::parse(&format!("http://localhost:{port}/completeLogin")).unwrap(),
            ..AuthConfig::default()
        };
        let handle = LoopbackCallbackListener::from_config(&config)
            .unwrap()
            .start()
            .await
            .unwrap();

        let v6_addr = SocketAddr::new(Ipv6Addr::LOCALHOST.into(), port);
        let response = reqwest::get(callback_url(v6_addr, "code=over-v6&state=s"))
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        let params = handle.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(params.code.as_deref(), Some("over-v6"));
        assert!(TcpStream::connect(v6_addr).await.is_err());
    }

    #[tokio::test]
    async fn test_start_reports_bind_failure() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = occupied.local_addr().unwrap();

        let result = LoopbackCallbackListener::new(addr, "/completeLogin")
            .start()
            .await;
        assert!(matches!(result, Err(AuthError::ListenerBind { .. })));
    }
}
