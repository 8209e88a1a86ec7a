//! WebSocket upgrade request validation.
//!
//! The HTTP layer hands the daemon the method, path, and headers of a request
//! asking to be promoted to a WebSocket. Validation is strict: the request
//! must target exactly `<web_path>/ws` with the standard upgrade headers, and
//! any missing or mismatched element rejects it.

/// Suffix appended to the terminal web path for the WebSocket endpoint.
pub const WS_PATH_SUFFIX: &str = "/ws";

/// A borrowed view of an HTTP upgrade request.
///
/// Header names are matched case-insensitively, so callers can pass headers
/// in whatever casing their HTTP library preserves.
#[derive(Debug, Clone, Copy)]
pub struct UpgradeRequest<'a> {
    /// HTTP method, e.g. `"GET"`.
    pub method: &'a str,
    /// Request path, without query string.
    pub path: &'a str,
    /// Request headers as (name, value) pairs.
    pub headers: &'a [(&'a str, &'a str)],
}

impl<'a> UpgradeRequest<'a> {
    /// Returns the first header value whose name matches case-insensitively.
    fn header(&self, name: &str) -> Option<&'a str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| *v)
    }

    /// Validates this request as a terminal WebSocket upgrade.
    ///
    /// Requirements:
    /// - method is `GET`
    /// - path equals `<web_path>/ws` exactly
    /// - `Upgrade: websocket` (case-insensitive value match)
    /// - `Connection` header containing `upgrade` (case-insensitive)
    /// - a non-empty `Sec-WebSocket-Key` header (presence only; the value is
    ///   consumed by the handshake layer)
    pub fn validate(&self, web_path: &str) -> bool {
        if self.method != "GET" {
            return false;
        }

        let expected = format!("{web_path}{WS_PATH_SUFFIX}");
        if self.path != expected {
            return false;
        }

        let Some(upgrade) = self.header("Upgrade") else {
            return false;
        };
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return false;
        }

        let Some(connection) = self.header("Connection") else {
            return false;
        };
        if !connection.to_ascii_lowercase().contains("upgrade") {
            return false;
        }

        match self.header("Sec-WebSocket-Key") {
            Some(key) => !key.is_empty(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_HEADERS: &[(&str, &str)] = &[
        ("Upgrade", "websocket"),
        ("Connection", "Upgrade"),
        ("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ=="),
    ];

    fn request<'a>(
        method: &'a str,
        path: &'a str,
        headers: &'a [(&'a str, &'a str)],
    ) -> UpgradeRequest<'a> {
        UpgradeRequest {
            method,
            path,
            headers,
        }
    }

    #[test]
    fn test_valid_upgrade() {
        let req = request("GET", "/terminal/ws", VALID_HEADERS);
        assert!(req.validate("/terminal"));
    }

    #[test]
    fn test_rejects_post() {
        let req = request("POST", "/terminal/ws", VALID_HEADERS);
        assert!(!req.validate("/terminal"));
    }

    #[test]
    fn test_rejects_wrong_path() {
        let req = request("GET", "/terminal", VALID_HEADERS);
        assert!(!req.validate("/terminal"));

        let req = request("GET", "/terminal/ws/extra", VALID_HEADERS);
        assert!(!req.validate("/terminal"));
    }

    #[test]
    fn test_rejects_missing_handshake_key() {
        let headers = &[("Upgrade", "websocket"), ("Connection", "Upgrade")];
        let req = request("GET", "/terminal/ws", headers);
        assert!(!req.validate("/terminal"));
    }

    #[test]
    fn test_rejects_empty_handshake_key() {
        let headers = &[
            ("Upgrade", "websocket"),
            ("Connection", "Upgrade"),
            ("Sec-WebSocket-Key", ""),
        ];
        let req = request("GET", "/terminal/ws", headers);
        assert!(!req.validate("/terminal"));
    }

    #[test]
    fn test_rejects_wrong_upgrade_value() {
        let headers = &[
            ("Upgrade", "h2c"),
            ("Connection", "Upgrade"),
            ("Sec-WebSocket-Key", "abc"),
        ];
        let req = request("GET", "/terminal/ws", headers);
        assert!(!req.validate("/terminal"));
    }

    #[test]
    fn test_connection_header_token_list() {
        // Browsers commonly send "keep-alive, Upgrade".
        let headers = &[
            ("upgrade", "WebSocket"),
            ("connection", "keep-alive, Upgrade"),
            ("sec-websocket-key", "abc"),
        ];
        let req = request("GET", "/terminal/ws", headers);
        assert!(req.validate("/terminal"));
    }

    #[test]
    fn test_rejects_missing_connection_header() {
        let headers = &[("Upgrade", "websocket"), ("Sec-WebSocket-Key", "abc")];
        let req = request("GET", "/terminal/ws", headers);
        assert!(!req.validate("/terminal"));
    }
}
