//! Property tests for the item naming transform and substrate validation

use proptest::prelude::*;

use lws_fulfillment::gates::{validate_printed_substrate, ItemKind};
use lws_fulfillment::{core_of, derive_dependent};

fn core_code() -> impl Strategy<Value = String> {
    "[A-Z0-9]{2,6}(-[A-Z0-9]{1,6}){0,3}".prop_filter("already prefixed", |c| ItemKind::of(c).is_none())
}

fn kind() -> impl Strategy<Value = ItemKind> {
    prop_oneof![Just(ItemKind::Substrate), Just(ItemKind::FinishedGood)]
}

proptest! {
    #[test]
    fn derived_codes_strip_back_to_core(core in core_code(), kind in kind()) {
        let derived = derive_dependent(&core, kind);
        prop_assert_eq!(core_of(&derived), core.clone());
        prop_assert_eq!(ItemKind::of(&derived), Some(kind));
    }

    #[test]
    fn deriving_twice_changes_nothing(core in core_code(), first in kind(), second in kind()) {
        let once = derive_dependent(&core, second);
        let twice = derive_dependent(&derive_dependent(&core, first), second);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn core_of_ignores_case_and_padding(core in core_code(), kind in kind()) {
        let messy = format!("  {}{}  ", kind.prefix().to_ascii_lowercase(), core);
        prop_assert_eq!(core_of(&messy), core);
    }

    #[test]
    fn own_substrate_always_validates(
        core in core_code(),
        others in prop::collection::vec("[A-Z]{3}-[0-9]{2,4}", 0..4),
    ) {
        let mut items = others;
        items.push(derive_dependent(&core, ItemKind::Substrate));
        prop_assert!(validate_printed_substrate(&core, &items).is_ok());
    }

    #[test]
    fn foreign_substrate_is_reported(core in core_code(), other in core_code()) {
        prop_assume!(core != other);
        let items = vec![derive_dependent(&other, ItemKind::Substrate)];
        let mismatch = validate_printed_substrate(&core, &items).unwrap_err();
        prop_assert_eq!(mismatch.invalid, items);
        prop_assert_eq!(mismatch.expected, derive_dependent(&core, ItemKind::Substrate));
    }
}
