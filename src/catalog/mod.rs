use rand::Rng;
use uuid::Uuid;

use crate::identity::Identity;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndpointKind {
    Activation,
    Generic,
}

#[derive(Clone, Debug)]
pub struct Endpoint {
    pub path: String,
    pub kind: EndpointKind,
}

impl Endpoint {
    pub fn activation(path: &str) -> Self {
        Self {
            path: path.to_string(),
            kind: EndpointKind::Activation,
        }
    }

    pub fn generic(path: &str) -> Self {
        Self {
            path: path.to_string(),
            kind: EndpointKind::Generic,
        }
    }
}

pub const ACTIVATION_PATHS: [&str; 5] = [
    "/api/activate_member",
    "/api/license/activate",
    "/api/subscription/activate",
    "/api/device/verify",
    "/api/verify",
];

pub const GENERIC_PATHS: [&str; 32] = [
    "/api/check_member",
    "/api/refresh_account",
    "/api/license/generate-codes",
    "/api/auth",
    "/api/status",
    "/api/user/info",
    "/api/user/update",
    "/api/license/check",
    "/api/device/register",
    "/api/subscription/check",
    "/api/login",
    "/api/register",
    "/api/reset-password",
    "/api/logout",
    "/api/token/refresh",
    "/api/user/profile",
    "/api/user/settings",
    "/api/license/list",
    "/api/license/revoke",
    "/api/device/list",
    "/api/device/delete",
    "/api/subscription/plans",
    "/api/subscription/cancel",
    "/api/webhook",
    "/api/stats",
    "/api/health",
    "/admin/users",
    "/admin/licenses",
    "/admin/devices",
    "/admin/stats",
    "/graphql",
    "/api/graphql",
];

pub fn default_endpoints() -> Vec<Endpoint> {
    let mut out: Vec<Endpoint> = Vec::new();
    for path in ACTIVATION_PATHS {
        out.push(Endpoint::activation(path));
    }
    for path in GENERIC_PATHS {
        out.push(Endpoint::generic(path));
    }
    out
}

// code-format patterns tried in catalog order for every activation endpoint
pub const ACTIVATION_PATTERNS: [&str; 5] = [
    "XXXX-XXXX-XXXX-XXXX",
    "XXXXXXXXXXXXXXXX",
    "XXXX-NNNNNN",
    "AAAA-AAAA-AAAA-AAAA",
    "PRO-XXXX-NNNN",
];

/// One plausible client fingerprint. A template is cloned per request, never
/// shared, and its volatile fields are restamped on every use.
#[derive(Clone, Debug)]
pub struct HeaderTemplate {
    pub headers: Vec<(String, String)>,
}

impl HeaderTemplate {
    fn new(pairs: &[(&str, &str)]) -> Self {
        Self {
            headers: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Clones the template and overwrites the per-request fields.
    pub fn stamped(&self) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = self
            .headers
            .iter()
            .filter(|(k, _)| k != "X-Timestamp" && k != "X-Request-ID")
            .cloned()
            .collect();
        headers.push((
            "X-Timestamp".to_string(),
            chrono::Utc::now().timestamp().to_string(),
        ));
        headers.push(("X-Request-ID".to_string(), Uuid::new_v4().to_string()));
        headers
    }
}

pub fn header_templates(identity: &Identity) -> Vec<HeaderTemplate> {
    vec![
        HeaderTemplate::new(&[
            (
                "User-Agent",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
            ),
            ("Accept", "application/json"),
            ("Content-Type", "application/json"),
            ("X-Request-ID", ""),
        ]),
        HeaderTemplate::new(&[
            ("User-Agent", "ApiProbe/1.0"),
            ("Accept", "application/json"),
            ("Content-Type", "application/json"),
            ("X-Device-ID", &identity.device_id),
        ]),
        HeaderTemplate::new(&[
            ("User-Agent", "ApiProbe/2.0"),
            ("Accept", "application/json"),
            ("Content-Type", "application/json"),
            ("X-Client-Version", "2.0.0"),
            ("X-Machine-ID", &identity.machine_code),
        ]),
    ]
}

pub fn choose_template(templates: &[HeaderTemplate]) -> &HeaderTemplate {
    let idx = rand::thread_rng().gen_range(0..templates.len());
    &templates[idx]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_tags_activation_paths() {
        let endpoints = default_endpoints();
        for path in ACTIVATION_PATHS {
            let ep = endpoints.iter().find(|e| e.path == path).unwrap();
            assert_eq!(ep.kind, EndpointKind::Activation);
        }
        assert_eq!(
            endpoints
                .iter()
                .filter(|e| e.kind == EndpointKind::Generic)
                .count(),
            GENERIC_PATHS.len()
        );
        assert!(endpoints.iter().any(|e| e.path == "/api/graphql"));
    }

    #[test]
    fn stamped_headers_carry_fresh_volatile_fields() {
        let identity = Identity::detect();
        let templates = header_templates(&identity);
        for template in &templates {
            let headers = template.stamped();
            assert!(headers.iter().any(|(k, _)| k == "X-Timestamp"));
            let request_id = headers
                .iter()
                .find(|(k, _)| k == "X-Request-ID")
                .map(|(_, v)| v.clone())
                .unwrap();
            assert!(!request_id.is_empty());
            // exactly one of each volatile field, even when the template
            // itself declares a placeholder
            assert_eq!(
                headers.iter().filter(|(k, _)| k == "X-Request-ID").count(),
                1
            );
        }
    }

    #[test]
    fn stamped_request_ids_differ_between_uses() {
        let identity = Identity::detect();
        let template = &header_templates(&identity)[0];
        let a = template.stamped();
        let b = template.stamped();
        let id = |h: &[(String, String)]| {
            h.iter()
                .find(|(k, _)| k == "X-Request-ID")
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_ne!(id(&a), id(&b));
    }
}
