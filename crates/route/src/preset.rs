//! Preset-driven route generation.
//!
//! A preset describes the action plan generated for every account of a
//! batch run: an ordered action list, a parameter blob shared by all
//! generated actions, optional per-kind repeat ranges expanded at
//! creation time, and an optional one-time shuffle of the order indexes.
//! Execution never reorders; randomization happens here or not at all.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use caravan_core::AccountId;

use crate::error::RouteError;
use crate::model::{Route, RouteAction};

/// One action slot in a preset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetAction {
    /// Machine-readable action kind, resolved against the action registry.
    pub kind: String,
    /// Human-readable name for logs and reports.
    pub name: String,
}

/// Inclusive repeat range applied to an action kind at generation time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RepeatRange {
    /// Minimum repetitions.
    pub min: u32,
    /// Maximum repetitions.
    pub max: u32,
}

impl RepeatRange {
    /// Sample a repetition count from the inclusive range.
    #[must_use]
    pub fn sample(&self) -> u32 {
        if self.min >= self.max {
            self.min
        } else {
            fastrand::u32(self.min..=self.max)
        }
    }
}

/// A route generation preset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutePreset {
    /// Preset name, used in logs and error messages.
    pub name: String,
    /// Ordered action list.
    pub actions: Vec<PresetAction>,
    /// Parameter blob shared by every generated action.
    #[serde(default = "default_params")]
    pub params: serde_json::Value,
    /// Per-kind repeat ranges. Kinds not listed generate exactly once.
    #[serde(default)]
    pub repeats: HashMap<String, RepeatRange>,
    /// Shuffle order indexes once at generation time.
    #[serde(default)]
    pub shuffle_actions: bool,
}

fn default_params() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl RoutePreset {
    /// Parse a preset from TOML text and validate it.
    pub fn from_toml_str(input: &str) -> Result<Self, RouteError> {
        let preset: Self = toml::from_str(input)?;
        preset.validate()?;
        Ok(preset)
    }

    /// Validate the preset: at least one action, well-formed repeat ranges,
    /// and every repeat kind present in the action list.
    pub fn validate(&self) -> Result<(), RouteError> {
        if self.actions.is_empty() {
            return Err(RouteError::EmptyPreset(self.name.clone()));
        }
        for (kind, range) in &self.repeats {
            if range.min > range.max {
                return Err(RouteError::InvalidRepeatRange {
                    preset: self.name.clone(),
                    kind: kind.clone(),
                    min: range.min,
                    max: range.max,
                });
            }
            if !self.actions.iter().any(|a| &a.kind == kind) {
                return Err(RouteError::UnknownRepeatKind {
                    preset: self.name.clone(),
                    kind: kind.clone(),
                });
            }
        }
        Ok(())
    }

    /// Generate a route for one account.
    ///
    /// Repeat ranges are sampled per account, so two accounts generated
    /// from the same preset may receive different repetition counts.
    #[must_use]
    pub fn build_route(&self, account_id: AccountId) -> Route {
        let mut route = Route::new(account_id);
        let params = Arc::new(self.params.clone());

        let mut order_index = 0u32;
        for preset_action in &self.actions {
            let count = self
                .repeats
                .get(&preset_action.kind)
                .map_or(1, RepeatRange::sample);
            for _ in 0..count {
                route.actions.push(RouteAction::new(
                    route.id,
                    preset_action.kind.clone(),
                    preset_action.name.clone(),
                    order_index,
                    Arc::clone(&params),
                ));
                order_index += 1;
            }
        }

        if self.shuffle_actions {
            shuffle_order_indexes(&mut route.actions);
            route.sort_actions();
        }

        route
    }
}

/// Permute the order indexes among the given actions in place.
fn shuffle_order_indexes(actions: &mut [RouteAction]) {
    let mut indexes: Vec<u32> = actions.iter().map(|a| a.order_index).collect();
    fastrand::shuffle(&mut indexes);
    for (action, index) in actions.iter_mut().zip(indexes) {
        action.order_index = index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::RouteStatus;

    fn preset(toml_str: &str) -> RoutePreset {
        RoutePreset::from_toml_str(toml_str).unwrap()
    }

    const BASIC: &str = r#"
        name = "daily"

        [[actions]]
        kind = "swap"
        name = "Token swap"

        [[actions]]
        kind = "bridge"
        name = "Bridge out"
    "#;

    #[test]
    fn parses_ordered_actions() {
        let p = preset(BASIC);
        assert_eq!(p.name, "daily");
        assert_eq!(p.actions.len(), 2);
        assert_eq!(p.actions[0].kind, "swap");
        assert_eq!(p.actions[1].kind, "bridge");
    }

    #[test]
    fn build_route_assigns_sequential_indexes() {
        let route = preset(BASIC).build_route(AccountId::v4());
        assert_eq!(route.actions.len(), 2);
        assert_eq!(route.actions[0].order_index, 0);
        assert_eq!(route.actions[1].order_index, 1);
        assert!(route.actions.iter().all(|a| a.status == RouteStatus::Pending));
    }

    #[test]
    fn actions_share_one_params_blob() {
        let route = preset(BASIC).build_route(AccountId::v4());
        assert!(Arc::ptr_eq(
            &route.actions[0].params,
            &route.actions[1].params
        ));
    }

    #[test]
    fn repeats_expand_within_range() {
        let p = preset(
            r#"
            name = "repeats"

            [[actions]]
            kind = "swap"
            name = "Token swap"

            [repeats]
            swap = { min = 2, max = 4 }
        "#,
        );
        for _ in 0..20 {
            let route = p.build_route(AccountId::v4());
            assert!((2..=4).contains(&route.actions.len()));
        }
    }

    #[test]
    fn empty_preset_is_rejected() {
        let err = RoutePreset::from_toml_str(
            r#"
            name = "empty"
            actions = []
        "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("declares no actions"));
    }

    #[test]
    fn inverted_repeat_range_is_rejected() {
        let err = RoutePreset::from_toml_str(
            r#"
            name = "bad"

            [[actions]]
            kind = "swap"
            name = "Token swap"

            [repeats]
            swap = { min = 5, max = 2 }
        "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("min 5 > max 2"));
    }

    #[test]
    fn repeat_for_unknown_kind_is_rejected() {
        let err = RoutePreset::from_toml_str(
            r#"
            name = "bad"

            [[actions]]
            kind = "swap"
            name = "Token swap"

            [repeats]
            bridge = { min = 1, max = 2 }
        "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown action kind"));
    }

    #[test]
    fn shuffle_preserves_index_set() {
        let p = preset(
            r#"
            name = "shuffled"
            shuffle_actions = true

            [[actions]]
            kind = "a"
            name = "A"

            [[actions]]
            kind = "b"
            name = "B"

            [[actions]]
            kind = "c"
            name = "C"

            [[actions]]
            kind = "d"
            name = "D"
        "#,
        );
        let route = p.build_route(AccountId::v4());
        let mut indexes: Vec<u32> = route.actions.iter().map(|a| a.order_index).collect();
        indexes.sort_unstable();
        assert_eq!(indexes, vec![0, 1, 2, 3]);
        // After sort_actions the list is ordered by index again.
        assert!(
            route
                .actions
                .windows(2)
                .all(|w| w[0].order_index < w[1].order_index)
        );
    }

    #[test]
    fn params_blob_carried_into_actions() {
        let p = preset(
            r#"
            name = "params"

            [[actions]]
            kind = "swap"
            name = "Token swap"

            [params]
            slippage = 0.5
        "#,
        );
        let route = p.build_route(AccountId::v4());
        assert_eq!(route.actions[0].params["slippage"], 0.5);
    }
}
