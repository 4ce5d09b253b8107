use serde::{Deserialize, Serialize};

/// Provider + model selection carried through a goal's `meta` so that
/// continuation calls remain stateless on the network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub fallback_models: Vec<String>,
}

impl ApiConfig {
    /// `[requested, ...explicitFallbacks, ...defaultFallbacks]`.C4 step 2.
    pub fn model_ladder<'a>(&'a self, default_fallbacks: &'a [String]) -> Vec<&'a str> {
        let mut ladder = Vec::with_capacity(1 + self.fallback_models.len() + default_fallbacks.len());
        ladder.push(self.model.as_str());
        ladder.extend(self.fallback_models.iter().map(String::as_str));
        ladder.extend(
            default_fallbacks
                .iter()
                .map(String::as_str)
                .filter(|m| *m != self.model && !self.fallback_models.iter().any(|f| f == m)),
        );
        ladder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_ladder_orders_requested_then_explicit_then_default() {
        let config = ApiConfig {
            provider: "anthropic".to_string(),
            model: "model-a".to_string(),
            fallback_models: vec!["model-b".to_string()],
        };
        let defaults = vec!["model-b".to_string(), "model-c".to_string()];
        let ladder = config.model_ladder(&defaults);
        assert_eq!(ladder, vec!["model-a", "model-b", "model-c"]);
    }
}
