//! Property-based coverage for the `malloy://` URI grammar, adversarially
//! testing the round-trip guarantee beyond the fixed cases in `mcp::uri`'s
//! own unit tests.

use proptest::prelude::*;
use publisher::mcp::uri::MalloyUri;

fn identifier_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_-]{0,30}").unwrap()
}

// Flat (single-segment) model paths only: a directory component equal to the
// literal "sources" or "queries" would collide with the grammar's own
// delimiters and is already covered by the fixed-case unit test in
// `mcp::uri` (`model_path_with_subdirectory_parses`).
fn model_path_strategy() -> impl Strategy<Value = String> {
    identifier_strategy().prop_map(|n| format!("{n}.malloy"))
}

proptest! {
    #[test]
    fn project_uri_round_trips(project in identifier_strategy()) {
        let uri = MalloyUri::Project { project };
        prop_assert_eq!(MalloyUri::parse(&uri.build()).unwrap(), uri);
    }

    #[test]
    fn package_uri_round_trips(project in identifier_strategy(), package in identifier_strategy()) {
        let uri = MalloyUri::Package { project, package };
        prop_assert_eq!(MalloyUri::parse(&uri.build()).unwrap(), uri);
    }

    #[test]
    fn model_uri_round_trips(
        project in identifier_strategy(),
        package in identifier_strategy(),
        model_path in model_path_strategy(),
    ) {
        let uri = MalloyUri::Model { project, package, model_path };
        prop_assert_eq!(MalloyUri::parse(&uri.build()).unwrap(), uri);
    }

    #[test]
    fn view_uri_round_trips(
        project in identifier_strategy(),
        package in identifier_strategy(),
        model_path in model_path_strategy(),
        source in identifier_strategy(),
        view in identifier_strategy(),
    ) {
        let uri = MalloyUri::View { project, package, model_path, source, view };
        prop_assert_eq!(MalloyUri::parse(&uri.build()).unwrap(), uri);
    }

    #[test]
    fn arbitrary_non_scheme_strings_never_panic(s in ".*") {
        let _ = MalloyUri::parse(&s);
    }
}
