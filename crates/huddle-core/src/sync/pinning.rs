use crate::models::chat::ChatSummary;

/// Move pinned entries ahead of unpinned ones.
///
/// A stable partition: inside each half, entries keep their current list
/// positions. No other key is consulted, so toggling `A` in
/// `[A, B*, C]` yields `[A*, B*, C]`.
pub fn partition_pinned<T: ChatSummary>(items: &mut Vec<T>) {
    let (pinned, unpinned): (Vec<T>, Vec<T>) = items.drain(..).partition(|item| item.is_pinned());
    items.extend(pinned);
    items.extend(unpinned);
}

/// Set the pinned flag of `id` and restore pinned-first order.
/// Returns false if no entry has that id.
pub fn apply_pin<T: ChatSummary>(items: &mut Vec<T>, id: &str, pinned: bool) -> bool {
    let Some(item) = items.iter_mut().find(|item| item.id() == id) else {
        return false;
    };
    item.set_pinned(pinned);
    partition_pinned(items);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GroupSummary;

    fn group(id: &str, pinned: bool) -> GroupSummary {
        GroupSummary {
            id: id.to_string(),
            name: id.to_uppercase(),
            description: None,
            invite_code: None,
            member_count: 1,
            is_pinned: pinned,
            unread_count: 0,
            last_message: None,
        }
    }

    fn ids(items: &[GroupSummary]) -> Vec<&str> {
        items.iter().map(|g| g.id.as_str()).collect()
    }

    #[test]
    fn test_pinning_first_entry_keeps_list_order() {
        let mut items = vec![group("a", false), group("b", true), group("c", false)];
        assert!(apply_pin(&mut items, "a", true));
        assert_eq!(ids(&items), ["a", "b", "c"]);
        assert!(items[0].is_pinned && items[1].is_pinned && !items[2].is_pinned);
    }

    #[test]
    fn test_pinning_last_entry_moves_it_forward() {
        let mut items = vec![group("a", true), group("b", false), group("c", false)];
        apply_pin(&mut items, "c", true);
        assert_eq!(ids(&items), ["a", "c", "b"]);
    }

    #[test]
    fn test_unpinning_keeps_relative_order() {
        let mut items = vec![group("a", true), group("b", true), group("c", false), group("d", false)];
        apply_pin(&mut items, "a", false);
        assert_eq!(ids(&items), ["b", "a", "c", "d"]);
    }

    #[test]
    fn test_unknown_id() {
        let mut items = vec![group("a", false)];
        assert!(!apply_pin(&mut items, "zzz", true));
        assert_eq!(ids(&items), ["a"]);
    }

    #[test]
    fn test_partition_is_stable() {
        let mut items = vec![
            group("1", false),
            group("2", true),
            group("3", false),
            group("4", true),
            group("5", false),
        ];
        partition_pinned(&mut items);
        assert_eq!(ids(&items), ["2", "4", "1", "3", "5"]);
    }
}
