//! Acting identity supplied with every mutating call

use serde::{Deserialize, Serialize};

/// Who is acting, from which branch
///
/// Supplied by the identity collaborator; the core never reads ambient
/// session state.
///
/// # Example
/// ```
/// use pawnshop_core_rs::models::ActorContext;
///
/// let ctx = ActorContext::new("U-17", "BR-KL01").with_ip("10.0.0.4");
/// assert_eq!(ctx.branch_id, "BR-KL01");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    pub user_id: String,
    pub branch_id: String,
    pub ip_address: Option<String>,
}

impl ActorContext {
    pub fn new(user_id: &str, branch_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            branch_id: branch_id.to_string(),
            ip_address: None,
        }
    }

    pub fn with_ip(mut self, ip_address: &str) -> Self {
        self.ip_address = Some(ip_address.to_string());
        self
    }
}
