use std::collections::HashMap;

/// Strip leading and trailing whitespace from every label.
pub fn trim_labels(labels: &[String]) -> Vec<String> {
    labels.iter().map(|label| label.trim().to_string()).collect()
}

/// Suffix repeated labels with `_1`, `_2`, ... in order of appearance.
///
/// The first occurrence keeps its name. A label that already looks like a
/// suffixed form is not checked against the generated names.
pub fn dedupe_labels(labels: &[String]) -> Vec<String> {
    let mut seen: HashMap<&str, usize> = HashMap::with_capacity(labels.len());
    labels
        .iter()
        .map(|label| {
            let count = seen.entry(label.as_str()).or_insert(0);
            let out = if *count == 0 {
                label.clone()
            } else {
                format!("{}_{}", label, count)
            };
            *count += 1;
            out
        })
        .collect()
}

/// Trim, then de-duplicate.
pub fn normalize_labels(labels: &[String]) -> Vec<String> {
    dedupe_labels(&trim_labels(labels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn repeated_labels_get_counters() {
        assert_eq!(
            normalize_labels(&strings(&["Name", "Name", "Name"])),
            strings(&["Name", "Name_1", "Name_2"])
        );
        assert_eq!(
            normalize_labels(&strings(&["id", "name", "id"])),
            strings(&["id", "name", "id_1"])
        );
    }

    #[test]
    fn trimming_happens_before_dedupe() {
        assert_eq!(
            normalize_labels(&strings(&[" A ", "A"])),
            strings(&["A", "A_1"])
        );
        assert_eq!(trim_labels(&strings(&["\tx\n", ""])), strings(&["x", ""]));
    }

    #[test]
    fn counters_are_per_label() {
        assert_eq!(
            dedupe_labels(&strings(&["a", "b", "a", "b", "a"])),
            strings(&["a", "b", "a_1", "b_1", "a_2"])
        );
    }

    #[test]
    fn suffixed_originals_are_left_alone() {
        assert_eq!(
            dedupe_labels(&strings(&["A", "A", "A_1"])),
            strings(&["A", "A_1", "A_1"])
        );
    }

    #[test]
    fn empty_input() {
        assert!(normalize_labels(&[]).is_empty());
    }

    // Labels without '_' cannot collide with generated names.
    fn plain_labels() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[ a-cA-C]{0,3}", 0..12)
    }

    proptest! {
        #[test]
        fn output_is_unique(labels in plain_labels()) {
            let out = normalize_labels(&labels);
            let unique: HashSet<&String> = out.iter().collect();
            prop_assert_eq!(unique.len(), out.len());
        }

        #[test]
        fn dedupe_is_idempotent(labels in plain_labels()) {
            let once = normalize_labels(&labels);
            prop_assert_eq!(normalize_labels(&once), once.clone());
        }

        #[test]
        fn order_and_length_are_kept(labels in plain_labels()) {
            let trimmed = trim_labels(&labels);
            let out = dedupe_labels(&trimmed);
            prop_assert_eq!(out.len(), labels.len());
            for (orig, new) in trimmed.iter().zip(&out) {
                prop_assert!(new.starts_with(orig.as_str()));
            }
        }
    }
}
