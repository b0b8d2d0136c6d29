use serde::{Deserialize, Serialize};

/// Signed-in user as returned by the auth endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    /// Kept verbatim; the service does not use a single timestamp format here
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Everything that survives between runs: auth token, user and onboarding flag
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub token: Option<String>,
    pub user: Option<User>,
    #[serde(default)]
    pub onboarding_complete: bool,
}

impl SessionContext {
    pub fn sign_in(&mut self, token: impl Into<String>, user: User) {
        self.token = Some(token.into());
        self.user = Some(user);
    }

    /// Forget the credentials. The onboarding flag survives sign-out.
    pub fn sign_out(&mut self) {
        self.token = None;
        self.user = None;
    }

    pub fn complete_onboarding(&mut self) {
        self.onboarding_complete = true;
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some() && self.user.is_some()
    }

    /// Value for the `Authorization` header
    pub fn bearer(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {}", t))
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }
}
