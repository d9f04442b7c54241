use std::collections::{BTreeSet, HashMap};

use crate::simulation_engine::adapter::Rgba;

/// Base colors handed out to platoons, in assignment order.
pub const PLATOON_PALETTE: [Rgba; 9] = [
    Rgba(255, 0, 0, 255),
    Rgba(0, 255, 0, 255),
    Rgba(0, 0, 255, 255),
    Rgba(255, 255, 0, 255),
    Rgba(255, 0, 255, 255),
    Rgba(0, 255, 255, 255),
    Rgba(128, 0, 0, 255),
    Rgba(0, 128, 0, 255),
    Rgba(0, 0, 128, 255),
];

/// Stable platoon-id to color mapping for the lifetime of a session.
///
/// The n-th platoon id ever seen gets palette entry `n % 9`, so colors repeat
/// once more than nine platoons have been assigned.
#[derive(Debug, Default)]
pub struct PlatoonColorManager {
    colors: HashMap<String, Rgba>,
    assigned: usize,
}

impl PlatoonColorManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Color for `platoon_id`, assigning the next palette entry on first sight.
    pub fn color_for(&mut self, platoon_id: &str) -> Rgba {
        if let Some(color) = self.colors.get(platoon_id) {
            return *color;
        }
        let color = PLATOON_PALETTE[self.assigned % PLATOON_PALETTE.len()];
        self.assigned += 1;
        self.colors.insert(platoon_id.to_string(), color);
        color
    }

    /// Drop every tracked platoon not in `active`. Returns the dropped ids,
    /// sorted.
    pub fn prune<'a, I>(&mut self, active: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let active: BTreeSet<&str> = active.into_iter().collect();
        let mut pruned: Vec<String> = self
            .colors
            .keys()
            .filter(|id| !active.contains(id.as_str()))
            .cloned()
            .collect();
        pruned.sort();
        for id in &pruned {
            self.colors.remove(id);
        }
        pruned
    }

    pub fn get(&self, platoon_id: &str) -> Option<Rgba> {
        self.colors.get(platoon_id).copied()
    }

    pub fn tracked_ids(&self) -> BTreeSet<&str> {
        self.colors.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_platoon_gets_first_palette_color() {
        let mut colors = PlatoonColorManager::new();
        assert_eq!(colors.color_for("P1"), Rgba(255, 0, 0, 255));
        assert_eq!(colors.color_for("P2"), Rgba(0, 255, 0, 255));
    }

    #[test]
    fn color_is_stable_while_others_come_and_go() {
        let mut colors = PlatoonColorManager::new();
        let p1 = colors.color_for("P1");
        colors.color_for("P2");
        colors.prune(["P1"]);
        colors.color_for("P3");
        assert_eq!(colors.color_for("P1"), p1);
        assert_eq!(colors.len(), 2);
    }

    #[test]
    fn reassignment_does_not_reuse_a_live_color_early() {
        let mut colors = PlatoonColorManager::new();
        colors.color_for("P1");
        let p2 = colors.color_for("P2");
        colors.prune(["P2"]);
        let p3 = colors.color_for("P3");
        assert_ne!(p3, p2);
        assert_eq!(p3, PLATOON_PALETTE[2]);
    }

    #[test]
    fn palette_wraps_after_nine_assignments() {
        let mut colors = PlatoonColorManager::new();
        for i in 0..9 {
            colors.color_for(&format!("P{i}"));
        }
        assert_eq!(colors.color_for("P9"), PLATOON_PALETTE[0]);
    }

    #[test]
    fn prune_keeps_exactly_the_active_ids() {
        let mut colors = PlatoonColorManager::new();
        for id in ["a", "b", "c"] {
            colors.color_for(id);
        }
        let pruned = colors.prune(["b", "z"]);
        assert_eq!(pruned, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(colors.tracked_ids(), BTreeSet::from(["b"]));
        assert_eq!(colors.get("a"), None);
    }
}
