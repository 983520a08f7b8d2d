// Karabinex End-to-End Test Scenarios
//
// Complete layer workflows through the public builder API, from Layer to the
// compiled karabiner.json tree.
//
// Run with: cargo test --test e2e_scenarios

use karabinex_core::analysis::{find_sequence_prefix_races, find_variable_collisions};
use karabinex_core::template::params;
use karabinex_core::{
    compute_static_coverage, Action, BuildError, ComboOptions, Condition, Document, KeyOrder,
    Layer, Profile, SimultaneousOptions, TemplateError, TemplateParams,
};
use serde_json::{json, Value};

// =========================================================================
// Test Helpers
// =========================================================================

fn manipulator(rule: &karabinex_core::Rule) -> Value {
    rule.compile()["manipulators"][0].clone()
}

fn hyper_layer() -> Layer {
    Layer::new("hyper", ["right_command"])
        .and_then(|l| l.map("h", "left_arrow"))
        .expect("valid layer")
}

// =========================================================================
// Layer scenarios
// =========================================================================

#[test]
fn hyper_layer_single_mapping() {
    let rules = hyper_layer().build_rules().unwrap();
    assert_eq!(rules.len(), 2);

    let m = manipulator(&rules[1]);
    assert_eq!(m["from"]["key_code"], "h");
    assert_eq!(m["to"], json!([{"key_code": "left_arrow"}]));
    assert_eq!(
        m["conditions"],
        json!([{"type": "variable_if", "name": "hyper", "value": 1}])
    );
}

#[test]
fn rule_count_matches_layer_contents() {
    let layer = Layer::new("nav", ["spacebar"])
        .and_then(|l| l.map("h", "left_arrow"))
        .and_then(|l| l.map("l", "right_arrow"))
        .and_then(|l| l.map_combo(["j", "k"], "escape"))
        .and_then(|l| l.map_sequence(["g", "g"], "home"))
        .and_then(|l| l.map_sequence(["d", "i", "w"], "delete_or_backspace"))
        .unwrap();

    // 1 activation + 2 mappings + 1 combo + (2 + 3) steps
    assert_eq!(layer.build_rules().unwrap().len(), 1 + 2 + 1 + 5);
}

#[test]
fn sequence_steps_chain_through_variables() {
    let layer = Layer::new("L", ["tab"])
        .and_then(|l| l.sequence_timeout(300))
        .and_then(|l| l.map_sequence(["g", "g"], "home"))
        .unwrap();
    let rules = layer.build_rules().unwrap();
    let step1 = manipulator(&rules[1]);
    let step2 = manipulator(&rules[2]);

    assert_eq!(
        step1["to_delayed_action"]["to_if_canceled"],
        json!([{"set_variable": {"name": "L_seq_g_g_step1", "value": 0}}])
    );
    assert_eq!(
        step1["parameters"]["basic.to_delayed_action_delay_milliseconds"],
        300
    );

    let conditions = step2["conditions"].as_array().unwrap();
    assert!(conditions.contains(&json!({"type": "variable_if", "name": "L_seq_g_g_step1", "value": 1})));

    let to = step2["to"].as_array().unwrap();
    let tail = &to[to.len() - 2..];
    assert_eq!(
        tail,
        [
            json!({"set_variable": {"name": "L_seq_g_g_step1", "value": 0}}),
            json!({"set_variable": {"name": "L_seq_g_g_step2", "value": 0}}),
        ]
    );
    assert!(to.contains(&json!({"key_code": "home"})));
}

#[test]
fn scope_conditions_skip_activation() {
    let layer = Layer::new("app", ["f13"])
        .map(|l| l.condition(Condition::app_if(["com.foo.Bar"])))
        .and_then(|l| l.map("a", "b"))
        .and_then(|l| l.map_combo(["s", "d"], "f"))
        .and_then(|l| l.map_sequence(["x", "y"], "z"))
        .unwrap();
    let rules = layer.build_rules().unwrap();

    assert!(manipulator(&rules[0]).get("conditions").is_none());
    let layer_var = json!({"type": "variable_if", "name": "app", "value": 1});
    let app = json!({"type": "frontmost_application_if", "bundle_identifiers": ["com.foo.Bar"]});
    for rule in &rules[1..] {
        let conditions = manipulator(rule)["conditions"].as_array().unwrap().clone();
        assert!(conditions.contains(&layer_var), "{}", rule.description());
        assert!(conditions.contains(&app), "{}", rule.description());
    }
}

#[test]
fn stacked_layer_uses_simultaneous_from() {
    let rules = Layer::new("x", ["a", "b"])
        .and_then(|l| l.build_rules())
        .unwrap();
    let from = &manipulator(&rules[0])["from"];
    assert_eq!(from["simultaneous"].as_array().unwrap().len(), 2);
}

#[test]
fn combo_options_only_when_set() {
    let plain = Layer::new("c", ["f1"])
        .and_then(|l| l.map_combo(["j", "k"], "escape"))
        .and_then(|l| l.build_rules())
        .unwrap();
    assert!(manipulator(&plain[1])["from"].get("simultaneous_options").is_none());

    let options = ComboOptions {
        simultaneous: SimultaneousOptions {
            key_down_order: KeyOrder::Strict,
            ..Default::default()
        },
        to_after_key_up: vec![Action::set_variable("combo_done", 1)],
    };
    let strict = Layer::new("c", ["f1"])
        .and_then(|l| l.map_combo_with(["j", "k"], vec![Action::key("escape")], options))
        .and_then(|l| l.build_rules())
        .unwrap();
    let m = manipulator(&strict[1]);
    assert_eq!(m["from"]["simultaneous_options"], json!({"key_down_order": "strict"}));
    assert_eq!(
        m["to_after_key_up"],
        json!([{"set_variable": {"name": "combo_done", "value": 1}}])
    );
}

#[test]
fn bad_macro_fails_whole_layer() {
    let missing = Layer::new("m", ["f2"])
        .and_then(|l| l.map("a", "b"))
        .and_then(|l| l.map_macro("t", "typed_text", TemplateParams::new()))
        .unwrap();
    assert!(matches!(
        missing.build_rules(),
        Err(BuildError::Template(TemplateError::MissingParameter { .. }))
    ));

    let unknown = Layer::new("m", ["f2"])
        .and_then(|l| l.map_macro("t", "no_such_template", params([("x", "y")])))
        .unwrap();
    assert!(matches!(
        unknown.build_rules(),
        Err(BuildError::Template(TemplateError::UnknownTemplate(_)))
    ));
}

#[test]
fn invalid_arguments_echo_input() {
    let err = Layer::new("s", ["f3"])
        .and_then(|l| l.map_sequence(["g"], "home"))
        .unwrap_err();
    assert!(err.to_string().contains("\"g\""));

    assert!(Layer::new("s", ["a", "b"])
        .and_then(|l| l.tap_alone("escape"))
        .is_err());
    assert!(Layer::new("s", Vec::<String>::new()).is_err());
}

// =========================================================================
// Document properties
// =========================================================================

#[test]
fn compile_is_idempotent() {
    let document = Document::new().add_profile(
        Profile::new("Default")
            .add_layer(&hyper_layer())
            .unwrap()
            .set_parameter("basic.to_if_alone_timeout_milliseconds", 200),
    );
    assert_eq!(document.compile(), document.compile());
}

#[test]
fn compiled_tree_does_not_alias_builder() {
    let profile = Profile::new("Default").add_layer(&hyper_layer()).unwrap();
    let first = Document::new().add_profile(profile.clone()).compile();
    let snapshot = first.clone();

    // Keep building after the first compile
    let extended = profile
        .add_layer(&Layer::new("sym", ["right_option"]).unwrap())
        .unwrap();
    let second = Document::new().add_profile(extended).compile();

    assert_eq!(first, snapshot);
    assert_ne!(first, second);
}

#[test]
fn analysis_over_full_document() {
    let nav = Layer::new("nav", ["spacebar"])
        .and_then(|l| l.map("h", "left_arrow"))
        .and_then(|l| l.map_sequence(["g", "g"], "home"))
        .and_then(|l| l.map_sequence(["g", "e"], "end"))
        .unwrap();
    let app_nav = Layer::new("nav", ["tab"])
        .map(|l| l.when_app(["com.apple.Terminal"]))
        .and_then(|l| l.map("h", "home"))
        .unwrap();

    let doc = Document::new()
        .add_profile(
            Profile::new("Default")
                .add_layer(&nav)
                .and_then(|p| p.add_layer(&app_nav))
                .unwrap(),
        )
        .compile();

    let report = compute_static_coverage(&doc);
    assert!(report.potential_conflicts.contains_key("key(h)|m:|o:any"));
    assert_eq!(find_variable_collisions(&[&nav, &app_nav]).len(), 1);
    assert_eq!(find_sequence_prefix_races(&nav).len(), 1);
}
