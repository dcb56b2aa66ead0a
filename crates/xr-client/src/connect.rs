//! Configured and scoped sessions

use futures::future::BoxFuture;

use xr_core::config::ClientConfig;
use xr_core::{Connector, Credentials, LoginMethod, XapiResult};

use crate::session::SessionClient;

/// Build an HTTP client from `config` and log in
///
/// `slave_login` selects the emergency login variant and `api_version`, when
/// set, is requested at login.
pub async fn connect(config: &ClientConfig, credentials: &Credentials) -> XapiResult<SessionClient> {
    let mut client = SessionClient::from_config(config)?;
    let api_version = config.api_version.as_deref();

    match config.login_method() {
        LoginMethod::WithPassword => {
            client
                .login_with_password(&credentials.username, &credentials.password, api_version)
                .await?
        }
        LoginMethod::SlaveLocal => {
            client
                .slave_local_login_with_password(
                    &credentials.username,
                    &credentials.password,
                    api_version,
                )
                .await?
        }
    }

    Ok(client)
}

/// Connect, run `f` with the session, then log out unless `keep_session` is set
///
/// ```no_run
/// # async fn run() -> xr_core::XapiResult<()> {
/// use futures::FutureExt;
/// use xr_client::with_session;
/// use xr_core::{ClientConfig, Credentials};
///
/// let config = ClientConfig::with_endpoints(["https://xen1.example.com"]);
/// let creds = Credentials::new("root", "secret");
/// let vms = with_session(&config, &creds, |client| {
///     async move { client.call_raw("VM.get_all", &[]).await }.boxed()
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn with_session<R, F>(
    config: &ClientConfig,
    credentials: &Credentials,
    f: F,
) -> XapiResult<R>
where
    F: for<'a> FnOnce(&'a mut SessionClient) -> BoxFuture<'a, XapiResult<R>>,
{
    let mut client = connect(config, credentials).await?;
    scoped(&mut client, config.keep_session, f).await
}

/// Run `f` with an authenticated client, logging out afterwards unless `keep_session`
///
/// The logout happens whether or not `f` succeeded.
pub async fn scoped<C, R, F>(
    client: &mut SessionClient<C>,
    keep_session: bool,
    f: F,
) -> XapiResult<R>
where
    C: Connector,
    F: for<'a> FnOnce(&'a mut SessionClient<C>) -> BoxFuture<'a, XapiResult<R>>,
{
    let result = f(&mut *client).await;

    if keep_session {
        tracing::debug!("Keeping session on {} open", client.endpoint());
    } else {
        client.logout().await;
    }

    result
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;

    use super::*;
    use crate::testing::{always_ok, fail, MockConnector};
    use xr_core::{EndpointPool, ErrorKind};
    use xr_protocol::Value;

    async fn client(connector: &MockConnector) -> SessionClient<MockConnector> {
        let pool = EndpointPool::parse(["http://xen1/"]).unwrap();
        let mut client = SessionClient::new(pool, connector.clone());
        client.login_with_password("root", "secret", None).await.unwrap();
        client
    }

    #[tokio::test]
    async fn test_scoped_logs_out() {
        let connector = MockConnector::new(always_ok);
        let mut client = client(&connector).await;

        let value = scoped(&mut client, false, |c| {
            async move { c.call_raw("VM.get_all", &[]).await }.boxed()
        })
        .await
        .unwrap();

        assert_eq!(value, Value::from("ok"));
        assert_eq!(connector.count("session.logout"), 1);
        assert!(!client.is_authenticated());
    }

    #[tokio::test]
    async fn test_scoped_logs_out_after_failure() {
        let connector = MockConnector::new(|e, method, params| match method {
            "SR.destroy" => fail(&["SR_HAS_PBD", "OpaqueRef:sr"]),
            _ => always_ok(e, method, params),
        });
        let mut client = client(&connector).await;

        let err = scoped(&mut client, false, |c| {
            async move { c.call_raw("SR.destroy", &[]).await }.boxed()
        })
        .await
        .unwrap_err();

        assert_eq!(err.api_error().unwrap().kind, ErrorKind::SrHasPbd);
        assert_eq!(connector.count("session.logout"), 1);
    }

    #[tokio::test]
    async fn test_scoped_keeps_session() {
        let connector = MockConnector::new(always_ok);
        let mut client = client(&connector).await;

        scoped(&mut client, true, |c| {
            async move { c.call_raw("VM.get_all", &[]).await }.boxed()
        })
        .await
        .unwrap();

        assert_eq!(connector.count("session.logout"), 0);
        assert!(client.is_authenticated());
    }

    #[tokio::test]
    async fn test_connect_rejects_empty_config() {
        let err = connect(&ClientConfig::default(), &Credentials::new("root", "secret"))
            .await
            .err()
            .unwrap();
        assert!(err.is_fatal_config());
    }
}
