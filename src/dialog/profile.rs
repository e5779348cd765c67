use serde::{Deserialize, Serialize};

/// What the onboarding dialog has learned about a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

impl UserProfile {
    /// Returning users are the ones whose city is already known.
    pub fn is_onboarded(&self) -> bool {
        self.city.is_some()
    }

    pub fn greeting(&self) -> String {
        match (self.name.as_deref(), self.city.as_deref()) {
            (Some(name), Some(city)) => format!("Hello, {name} from {city}"),
            (None, Some(city)) => format!("Hello from {city}"),
            (Some(name), None) => format!("Hello, {name}"),
            (None, None) => "Hello".to_string(),
        }
    }
}
