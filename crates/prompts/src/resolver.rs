//! Placeholder resolution for prompt templates
//!
//! A template is plain text with `{slot}` placeholders. A slot named
//! `color_2` draws from the `color` pool; numbered slots sharing a pool get
//! distinct values until the pool runs dry, after which repeats are allowed.

use std::{
    collections::{BTreeMap, HashMap},
    sync::OnceLock,
};

use rand::{seq::SliceRandom, Rng};
use regex::{Captures, Regex};
use tracing::{debug, warn};

/// Category name → candidate values
pub type Pools = BTreeMap<String, Vec<String>>;

fn slot_pattern() -> &'static Regex {
    static SLOT: OnceLock<Regex> = OnceLock::new();
    SLOT.get_or_init(|| Regex::new(r"\{(\w+)\}").expect("slot pattern is valid"))
}

/// Distinct slot names in order of first appearance.
pub fn slot_names(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in slot_pattern().captures_iter(template) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Strips a trailing `_<digits>` suffix: `color_2` → `color`.
pub fn base_category(slot: &str) -> &str {
    match slot.rsplit_once('_') {
        Some((base, digits))
            if !base.is_empty() && !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) =>
        {
            base
        }
        _ => slot,
    }
}

/// Picks from `pool`, preferring values not in `used`. The flag is true when
/// every value was already used and the pick came from the full pool, in
/// which case the caller should start its used-set over.
pub fn pick_fresh<'a, R: Rng + ?Sized>(
    pool: &'a [String],
    used: &[String],
    rng: &mut R,
) -> Option<(&'a str, bool)> {
    let unused: Vec<&'a String> = pool.iter().filter(|v| !used.contains(v)).collect();
    if unused.is_empty() {
        pool.choose(rng).map(|v| (v.as_str(), true))
    } else {
        unused.choose(rng).map(|v| (v.as_str(), false))
    }
}

/// Filled template plus what went into it
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub text: String,
    /// Slot → chosen value, in slot order
    pub assignments: Vec<(String, String)>,
    /// Slots with no matching pool; they appear as `[slot]` in `text`
    pub missing: Vec<String>,
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Fills every slot of `template` from `pools`.
///
/// Unknown slots are not an error: they are rendered as `[slot]` and listed
/// in [`Resolution::missing`] so a half-finished catalog still yields prompts.
pub fn resolve<R: Rng + ?Sized>(template: &str, pools: &Pools, rng: &mut R) -> Resolution {
    let mut used_by_base: HashMap<String, Vec<String>> = HashMap::new();
    let mut assignments = Vec::new();
    let mut missing = Vec::new();

    for slot in slot_names(template) {
        let base = base_category(&slot);

        let value = if let Some(pool) = pools.get(base).filter(|p| !p.is_empty()) {
            let used = used_by_base.entry(base.to_string()).or_default();
            // non-empty pool always yields a pick
            let (value, recycled) = pick_fresh(pool, used, rng).unwrap_or((pool[0].as_str(), true));
            if recycled {
                used.clear();
            }
            used.push(value.to_string());
            value.to_string()
        } else if let Some(value) = pools.get(&slot).and_then(|p| p.choose(rng)) {
            value.clone()
        } else {
            warn!("No values for slot '{}' (category '{}')", slot, base);
            missing.push(slot.clone());
            format!("[{slot}]")
        };

        debug!("{} ({}) -> {}", slot, base, value);
        assignments.push((slot, value));
    }

    let text = slot_pattern()
        .replace_all(template, |caps: &Captures| {
            assignments
                .iter()
                .find(|(slot, _)| slot == &caps[1])
                .map(|(_, value)| value.clone())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned();

    Resolution {
        text,
        assignments,
        missing,
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    fn pools(entries: &[(&str, &[&str])]) -> Pools {
        entries
            .iter()
            .map(|(name, values)| (name.to_string(), values.iter().map(|v| v.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_base_category() {
        assert_eq!(base_category("color_2"), "color");
        assert_eq!(base_category("frame_settings"), "frame_settings");
        assert_eq!(base_category("light_10"), "light");
        assert_eq!(base_category("_3"), "_3");
        assert_eq!(base_category("color_"), "color_");
    }

    #[test]
    fn test_slot_names_deduplicates_in_order() {
        assert_eq!(
            slot_names("{b} then {a_1}, {b} again and {not a slot}"),
            vec!["b".to_string(), "a_1".to_string()]
        );
    }

    #[test]
    fn test_pick_fresh_avoids_used_until_exhausted() {
        let pool = vec!["red".to_string(), "blue".to_string()];
        let mut rng = StdRng::seed_from_u64(1);

        let (value, recycled) = pick_fresh(&pool, &["red".to_string()], &mut rng).unwrap();
        assert_eq!((value, recycled), ("blue", false));

        let (_, recycled) = pick_fresh(&pool, &pool, &mut rng).unwrap();
        assert!(recycled);
        assert!(pick_fresh(&[], &[], &mut rng).is_none());
    }

    #[test]
    fn test_numbered_slots_get_distinct_values() {
        let pools = pools(&[("color", &["red", "blue", "green", "amber"])]);
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..200 {
            let resolution = resolve("{color_1} and {color_2}", &pools, &mut rng);
            let (first, second) = (&resolution.assignments[0].1, &resolution.assignments[1].1);
            assert_ne!(first, second, "got {}", resolution.text);
        }
    }

    #[test]
    fn test_pool_reset_allows_repeats() {
        let pools = pools(&[("mood", &["calm", "eerie"])]);
        let mut rng = StdRng::seed_from_u64(3);

        let resolution = resolve("{mood_1} {mood_2} {mood_3}", &pools, &mut rng);
        assert!(resolution.is_complete());
        assert_ne!(resolution.assignments[0].1, resolution.assignments[1].1);
        assert!(!resolution.text.contains('{'));
    }

    #[test]
    fn test_exact_slot_pool_used_when_base_is_missing() {
        let pools = pools(&[("style_2", &["ukiyo-e"])]);
        let mut rng = StdRng::seed_from_u64(0);

        let resolution = resolve("in {style_2} style", &pools, &mut rng);
        assert_eq!(resolution.text, "in ukiyo-e style");
    }

    #[test]
    fn test_unknown_slot_falls_back_to_bracketed_name() {
        let pools = pools(&[("subject", &["a lighthouse"])]);
        let mut rng = StdRng::seed_from_u64(0);

        let resolution = resolve("{subject} under {weather_1}", &pools, &mut rng);
        assert_eq!(resolution.text, "a lighthouse under [weather_1]");
        assert_eq!(resolution.missing, vec!["weather_1".to_string()]);
        assert!(!resolution.is_complete());
    }

    #[test]
    fn test_values_are_not_rescanned_for_slots() {
        let pools = pools(&[("a", &["{b}"]), ("b", &["x"])]);
        let mut rng = StdRng::seed_from_u64(0);

        assert_eq!(resolve("{a}-{b}", &pools, &mut rng).text, "{b}-x");
    }
}
