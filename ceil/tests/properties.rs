//! Property tests: render/parse round trip and sandbox containment.

use ceil::audit::AuthorizationContext;
use ceil::core::ast::{Command, Program};
use ceil::core::parser::parse_source;
use ceil::core::render::render;
use ceil::core::types::Role;
use proptest::prelude::*;

fn target() -> impl Strategy<Value = String> {
    prop_oneof![
        "[A-Za-z0-9_./-]{1,16}",
        "[a-z0-9 ./'-]{1,16}",
        "[a-z0-9 \"]{1,8}",
    ]
}

fn block_content() -> impl Strategy<Value = String> {
    "[a-z0-9 <>=(){}'\"\t\n]{1,40}".prop_filter("close marker ends a block early", |s| {
        !s.contains(">>>")
    })
}

fn command() -> impl Strategy<Value = Command> {
    prop_oneof![
        (target(), block_content()).prop_map(|(file, content)| Command::Create { file, content }),
        (target(), block_content(), block_content()).prop_map(|(file, search, replace)| {
            Command::Patch {
                file,
                search,
                replace,
            }
        }),
        target().prop_map(|file| Command::Delete { file }),
        target().prop_map(|target| Command::Run { target }),
        target().prop_map(|url| Command::FetchExternal { url }),
    ]
}

fn segment() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("a"), Just("b"), Just("."), Just("..")]
}

/// True if walking `segments` from the root ever steps above it.
fn climbs_out(segments: &[&str]) -> bool {
    let mut depth = 0i32;
    for segment in segments {
        match *segment {
            ".." => depth -= 1,
            "." => {}
            _ => depth += 1,
        }
        if depth < 0 {
            return true;
        }
    }
    false
}

proptest! {
    #[test]
    fn rendered_programs_parse_back_unchanged(commands in prop::collection::vec(command(), 0..6)) {
        let program = Program::new(commands);
        let source = render(&program);
        let reparsed = parse_source(&source).expect("rendered source parses");
        prop_assert_eq!(reparsed, program, "source was:\n{}", source);
    }

    #[test]
    fn contained_paths_stay_under_the_root(segments in prop::collection::vec(segment(), 1..8)) {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = AuthorizationContext::new(temp.path(), Role::User).expect("context");
        let relative = segments.join("/");

        match ctx.contain(&relative) {
            Some(resolved) => {
                prop_assert!(!climbs_out(&segments), "{} escaped yet was accepted", relative);
                prop_assert!(resolved.starts_with(ctx.sandbox_root()));
            }
            None => prop_assert!(climbs_out(&segments), "{} was rejected", relative),
        }
    }
}
