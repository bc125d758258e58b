//! Properties of mode name parsing.

use proptest::prelude::*;

use jwt_auth_helper::mode::Mode;

fn arb_mode() -> impl Strategy<Value = Mode> {
    prop_oneof![Just(Mode::Injection), Just(Mode::Validation)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_any_casing_parses(mode in arb_mode(), flips in proptest::collection::vec(any::<bool>(), 32)) {
        let name: String = mode
            .as_str()
            .chars()
            .zip(flips.iter().cycle())
            .map(|(c, upper)| if *upper { c.to_ascii_uppercase() } else { c })
            .collect();
        prop_assert_eq!(name.parse::<Mode>(), Ok(mode));
    }

    #[test]
    fn prop_display_round_trips(mode in arb_mode()) {
        prop_assert_eq!(mode.to_string().parse::<Mode>(), Ok(mode));
    }

    #[test]
    fn prop_other_names_are_rejected(name in "[a-z_]{0,24}") {
        prop_assume!(name != "jwt_injection" && name != "jwt_svid_validator");
        let err = name.parse::<Mode>().unwrap_err();
        prop_assert_eq!(err.0, name);
    }
}
