use std::{path::Path, time::Duration};

use rama::{
    Layer as _, Service,
    error::{BoxError, ErrorContext as _},
    http::{
        Request, Response, Uri, body::util::BodyExt as _, client::EasyHttpWebClient,
        service::client::HttpClientExt as _,
    },
    layer::TimeoutLayer,
    rt::Executor,
    telemetry::tracing,
    utils::str::arcstr::ArcStr,
};

/// Create a new web client that can be cloned and shared.
///
/// Every request is bound by the given timeout,
/// with the timeout reported as a regular client error.
pub fn new_web_client(
    exec: Executor,
    request_timeout: Duration,
) -> Result<impl Service<Request, Output = Response, Error = BoxError> + Clone, BoxError> {
    let inner = EasyHttpWebClient::connector_builder()
        .with_default_transport_connector()
        .without_tls_proxy_support()
        .without_proxy_support()
        .with_tls_support_using_boringssl(None)
        .with_default_http_connector(exec)
        .try_with_default_connection_pool()
        .context("create connection pool for web client")?
        .build_client();

    Ok(TimeoutLayer::new(request_timeout).into_layer(inner))
}

/// Client bound to the base url of the monitored target.
///
/// All paths are resolved relative to that base url,
/// the empty path being the base url itself.
#[derive(Debug, Clone)]
pub struct TargetClient<C> {
    client: C,
    base: ArcStr,
}

impl<C> TargetClient<C> {
    pub fn new(client: C, target: &Uri) -> Self {
        let mut base = target.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Self {
            client,
            base: base.into(),
        }
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base, path.trim_start_matches('/'))
    }
}

impl<C> TargetClient<C>
where
    C: Service<Request, Output = Response, Error = BoxError>,
{
    /// GET the given path, any response counts as success.
    pub async fn get(&self, path: &str) -> Result<Response, BoxError> {
        let uri = self.endpoint(path);
        self.client
            .get(uri.as_str())
            .send()
            .await
            .context("send GET request to target")
            .with_context_field("uri", || uri.clone())
    }

    /// GET the given path and require a 2xx status.
    pub async fn get_success(&self, path: &str) -> Result<Response, BoxError> {
        let resp = self.get(path).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(BoxError::from(format!(
                "unexpected http status for '{}': {status}",
                self.endpoint(path),
            )));
        }
        Ok(resp)
    }

    /// GET the given path and store the payload at `dest`.
    ///
    /// Returns the amount of bytes written.
    pub async fn download(&self, path: &str, dest: &Path) -> Result<usize, BoxError> {
        let resp = self.get_success(path).await?;
        let payload = resp
            .into_body()
            .collect()
            .await
            .context("collect download payload")?
            .to_bytes();

        tokio::fs::write(dest, &payload)
            .await
            .context("write download to file")
            .with_context_debug_field("path", || dest.to_owned())?;

        tracing::debug!(path = ?dest, "stored {} bytes from '{}'", payload.len(), self.endpoint(path));
        Ok(payload.len())
    }
}
