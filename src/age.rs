use std::cmp::Ordering;

pub const CANONICAL_AGE_CATEGORIES: [&str; 12] = [
    "Neonates (<28 days)",
    "Under 5 years",
    "5–14 years",
    "15–24 years",
    "25–34 years",
    "35–44 years",
    "45–54 years",
    "55–64 years",
    "65–74 years",
    "75–84 years",
    "85–94 years",
    "95+ years",
];

/// Known labels sort by vocabulary position and precede unknown labels, which
/// fall back to string order.
#[derive(Debug, Clone)]
pub struct AgeOrder {
    labels: Vec<String>,
    normalized: Vec<String>,
}

impl Default for AgeOrder {
    fn default() -> Self {
        Self::new(CANONICAL_AGE_CATEGORIES.iter().map(|s| s.to_string()).collect())
    }
}

impl AgeOrder {
    pub fn new(labels: Vec<String>) -> Self {
        let normalized = labels.iter().map(|l| normalize(l)).collect();
        Self { labels, normalized }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        let needle = normalize(label);
        self.normalized.iter().position(|l| *l == needle)
    }

    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        match (self.position(a), self.position(b)) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.cmp(b),
        }
    }

    pub fn sort<S: AsRef<str>>(&self, items: &mut [S]) {
        items.sort_by(|a, b| self.compare(a.as_ref(), b.as_ref()));
    }
}

// Source data mixes ASCII hyphens and en-dashes in bracket labels.
fn normalize(label: &str) -> String {
    label.trim().replace('-', "–").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sorts_scenario_labels_clinically() {
        let order = AgeOrder::default();
        let mut v = vec!["65–74 years", "Under 5 years", "25–34 years"];
        order.sort(&mut v);
        assert_eq!(v, vec!["Under 5 years", "25–34 years", "65–74 years"]);
    }

    #[test]
    fn antisymmetric_and_transitive_over_vocabulary() {
        let order = AgeOrder::default();
        for (i, a) in CANONICAL_AGE_CATEGORIES.iter().enumerate() {
            for (j, b) in CANONICAL_AGE_CATEGORIES.iter().enumerate() {
                assert_eq!(order.compare(a, b), i.cmp(&j));
                assert_eq!(order.compare(a, b), order.compare(b, a).reverse());
            }
        }

        let mut shuffled: Vec<&str> = CANONICAL_AGE_CATEGORIES.iter().rev().copied().collect();
        shuffled.swap(0, 5);
        order.sort(&mut shuffled);
        assert_eq!(shuffled, CANONICAL_AGE_CATEGORIES.to_vec());
    }

    #[test]
    fn known_labels_precede_unknown_ones() {
        let order = AgeOrder::default();
        assert_eq!(order.compare("95+ years", "Adult"), Ordering::Less);
        assert_eq!(order.compare("Adult", "Neonates (<28 days)"), Ordering::Greater);
        assert_eq!(order.compare("Adult", "Child"), Ordering::Less);
    }

    #[test]
    fn hyphen_and_case_variants_resolve() {
        let order = AgeOrder::default();
        assert_eq!(order.position("5-14 years"), Some(2));
        assert_eq!(order.position("  under 5 YEARS "), Some(1));
        assert_eq!(order.position("unknown"), None);
    }
}
