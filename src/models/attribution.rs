use serde::{Deserialize, Serialize};
use url::Url;

/// Tag sent to the provider when the visitor arrived without any query string.
pub const DEFAULT_UTM_TAG: &str = "checkout-espiao";

/// Query-string parameters captured once when the session starts.
///
/// The value is carried verbatim to telemetry and to the delivery redirect
/// and is never inspected by the payment flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributionContext(String);

impl AttributionContext {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim_start_matches('?').to_string())
    }

    /// Captures the query of a landing URL. Unparseable URLs yield an empty context.
    pub fn from_landing_url(landing: &str) -> Self {
        match Url::parse(landing) {
            Ok(url) => Self::new(url.query().unwrap_or_default()),
            Err(_) => Self::default(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn provider_tag(&self) -> &str {
        if self.is_empty() {
            DEFAULT_UTM_TAG
        } else {
            &self.0
        }
    }

    /// Re-appends the captured query to `base`, using `&` when `base` already
    /// carries a query and `?` otherwise.
    pub fn append_to(&self, base: &str) -> String {
        if self.is_empty() {
            return base.to_string();
        }
        let separator = match base.find('?') {
            Some(idx) if idx + 1 == base.len() => "",
            Some(_) => "&",
            None => "?",
        };
        format!("{}{}{}", base, separator, self.0)
    }
}
