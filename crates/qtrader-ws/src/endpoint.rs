//! Transport endpoint resolution.

use crate::error::{WsError, WsResult};
use url::Url;

/// Override value that selects the local development endpoint.
pub const LOCAL_DEV_ALIAS: &str = "local";

/// Fixed endpoint used for local development.
pub const LOCAL_DEV_ENDPOINT: &str = "ws://127.0.0.1:8080/ws";

/// Well-known path of the tick stream.
const WS_PATH: &str = "/ws";

/// Build the WebSocket URL of the tick stream.
///
/// `backend_override` replaces `page_origin` when it is set and non-blank.
/// The scheme is upgraded (`http→ws`, `https→wss`) and the path is replaced
/// with `/ws`; query and fragment are dropped.
pub fn resolve_endpoint(page_origin: &str, backend_override: Option<&str>) -> WsResult<String> {
    let backend = backend_override.map(str::trim).filter(|s| !s.is_empty());

    if backend.is_some_and(|b| b.eq_ignore_ascii_case(LOCAL_DEV_ALIAS)) {
        return Ok(LOCAL_DEV_ENDPOINT.to_string());
    }

    let base = backend.unwrap_or_else(|| page_origin.trim());
    let mut url = Url::parse(base)?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(WsError::InvalidEndpoint(format!(
                "unsupported scheme '{other}' in {base}"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| WsError::InvalidEndpoint(format!("cannot use scheme {scheme} for {base}")))?;
    url.set_path(WS_PATH);
    url.set_query(None);
    url.set_fragment(None);

    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_origin_upgrade() {
        assert_eq!(
            resolve_endpoint("http://localhost:5173", None).unwrap(),
            "ws://localhost:5173/ws"
        );
        assert_eq!(
            resolve_endpoint("https://host:8443/app?x=1", None).unwrap(),
            "wss://host:8443/ws"
        );
    }

    #[test]
    fn test_override_wins_over_origin() {
        assert_eq!(
            resolve_endpoint("https://page.example", Some("https://api.example/base#frag")).unwrap(),
            "wss://api.example/ws"
        );
    }

    #[test]
    fn test_blank_override_ignored() {
        assert_eq!(
            resolve_endpoint("http://page.example", Some("   ")).unwrap(),
            "ws://page.example/ws"
        );
    }

    #[test]
    fn test_local_alias() {
        assert_eq!(
            resolve_endpoint("https://page.example", Some("LOCAL")).unwrap(),
            LOCAL_DEV_ENDPOINT
        );
    }

    #[test]
    fn test_ws_scheme_passthrough() {
        assert_eq!(
            resolve_endpoint("wss://stream.example:9000", None).unwrap(),
            "wss://stream.example:9000/ws"
        );
    }

    #[test]
    fn test_invalid_endpoints() {
        assert!(matches!(
            resolve_endpoint("ftp://files.example", None),
            Err(WsError::InvalidEndpoint(_))
        ));
        assert!(matches!(resolve_endpoint("", None), Err(WsError::Url(_))));
    }
}
