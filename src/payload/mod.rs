use std::sync::Arc;

use rand::Rng;
use serde_json::{json, Map, Value};

use crate::catalog::Endpoint;
use crate::codegen::CodeGenerator;
use crate::identity::Identity;

pub type Payload = Map<String, Value>;

// priority order used when pulling the activation-identifying field back out
// of a request payload
pub const CODE_FIELDS: [&str; 5] = [
    "activation_code",
    "license_key",
    "subscription_key",
    "verification_code",
    "code",
];

#[derive(Clone, Debug)]
pub struct PayloadBuilder {
    identity: Identity,
    codes: Arc<CodeGenerator>,
}

impl PayloadBuilder {
    pub fn new(identity: Identity, codes: Arc<CodeGenerator>) -> Self {
        Self { identity, codes }
    }

    pub fn codes(&self) -> &CodeGenerator {
        &self.codes
    }

    /// Base fields plus the endpoint-specific set from the fixed lookup
    /// table. Every call draws one activation code, even for endpoints that
    /// discard it.
    pub fn build_base(&self, endpoint: &Endpoint) -> Payload {
        let code = self.codes.generate();
        self.assemble(endpoint, code)
    }

    /// Same as [`build_base`](Self::build_base) but with the code drawn from
    /// an explicit format pattern instead of a random format.
    pub fn build_with_pattern(&self, endpoint: &Endpoint, pattern: &str) -> Payload {
        let code = self.codes.generate_from_pattern(pattern);
        self.assemble(endpoint, code)
    }

    fn assemble(&self, endpoint: &Endpoint, code: String) -> Payload {
        let mut payload = Payload::new();
        payload.insert("device_id".into(), json!(self.identity.device_id));
        payload.insert("timestamp".into(), json!(chrono::Utc::now().timestamp()));
        payload.insert("client_version".into(), json!("2.0.0"));
        payload.insert("platform".into(), json!(self.identity.platform));
        payload.insert("arch".into(), json!(self.identity.arch));
        payload.insert("machine_code".into(), json!(self.identity.machine_code));
        payload.insert("mac_address".into(), json!(self.identity.mac_address));

        match endpoint.path.as_str() {
            "/api/activate_member" => {
                payload.insert("activation_code".into(), json!(code));
                payload.insert("product".into(), json!("pro"));
            }
            "/api/license/activate" => {
                let n: u32 = rand::thread_rng().gen_range(1000..10000);
                payload.insert("license_key".into(), json!(code));
                payload.insert("product_id".into(), json!("pro"));
                payload.insert("email".into(), json!(format!("test_{n}@example.com")));
            }
            "/api/subscription/activate" => {
                payload.insert("subscription_key".into(), json!(code));
                payload.insert("plan_id".into(), json!("pro_plan"));
            }
            "/api/device/verify" => {
                payload.insert("verification_code".into(), json!(code));
            }
            "/api/verify" => {
                payload.insert("code".into(), json!(code));
                payload.insert("type".into(), json!("activation"));
            }
            _ => {}
        }

        payload
    }
}

/// First non-empty activation-identifying field, in fixed priority order.
pub fn extract_code(payload: &Payload) -> Option<String> {
    for field in CODE_FIELDS {
        if let Some(Value::String(code)) = payload.get(field) {
            if !code.is_empty() {
                return Some(code.clone());
            }
        }
    }
    None
}
