//! Spec-Model Tests
//!
//! Immutability after freeze and name uniqueness per scope.

mod common;

use common::TestModel;
use tbon_weaver::error::WeaverError;
use tbon_weaver::spec::{AnalysisGroup, ApiGroup, CallFlags};

#[test]
fn frozen_model_rejects_registrations() {
    let mut t = TestModel::new();
    let send = t.call_with_scalars("Send", &["dest"]);
    t.model.freeze();

    assert!(t.model.is_frozen());
    let result = t
        .model
        .register_call("Late", t.api_group, "int", CallFlags::default());
    assert!(matches!(result, Err(WeaverError::ConstraintViolation(_))));

    let result = t.model.add_call_argument(
        send,
        tbon_weaver::spec::Argument::scalar("late", "int", tbon_weaver::spec::ArgumentIntent::In),
    );
    assert!(matches!(result, Err(WeaverError::ConstraintViolation(_))));

    let result = t.model.register_api_group(ApiGroup::new("LateGroup", None));
    assert!(matches!(result, Err(WeaverError::ConstraintViolation(_))));
}

#[test]
fn frozen_model_still_answers_lookups() {
    let mut t = TestModel::new();
    let send = t.call_with_scalars("Send", &["dest"]);
    t.model.freeze();

    assert_eq!(t.model.find_call("Send"), Some(send));
    assert_eq!(t.model.call(send).arguments.len(), 1);
}

#[test]
fn call_names_unique_within_group() {
    let mut t = TestModel::new();
    t.call_with_scalars("Send", &["dest"]);
    let result = t
        .model
        .register_call("Send", t.api_group, "int", CallFlags::default());
    assert!(matches!(result, Err(WeaverError::ConstraintViolation(_))));

    // The same name in a different group is allowed.
    let other = t
        .model
        .register_api_group(ApiGroup::new("OtherApi", None))
        .unwrap();
    assert!(t
        .model
        .register_call("Send", other, "int", CallFlags::default())
        .is_ok());
}

#[test]
fn calculation_names_unique_within_group() {
    let mut t = TestModel::new();
    let module = t.module("SomeModule");
    t.analysis(module, "check", &["x"]);
    let result = t.model.register_analysis(tbon_weaver::spec::Analysis {
        function_name: "check".into(),
        module,
        group: t.analysis_group,
        inputs: vec![],
        needs_channel_id: false,
    });
    assert!(matches!(result, Err(WeaverError::ConstraintViolation(_))));

    t.operation("derive", &["x"], "int");
    let dup = t.model.register_operation(tbon_weaver::spec::Operation {
        name: "derive".into(),
        group: t.analysis_group,
        inputs: vec![],
        return_type: "int".into(),
        array_len_type: None,
        extra_headers: vec![],
        source_template: "$R = 0;".into(),
        cleanup_template: None,
    });
    assert!(matches!(dup, Err(WeaverError::ConstraintViolation(_))));
}

#[test]
fn module_names_unique_globally() {
    let mut t = TestModel::new();
    t.module("Tracker");
    let duplicate = tbon_weaver::spec::AnalysisModule {
        name: "Tracker".into(),
        module_name: "modTracker2".into(),
        config_name: "Tracker2".into(),
        instance_type: "I_Tracker".into(),
        header_name: "i_tracker.h".into(),
        include_dir: "modules".into(),
        group: t.analysis_group,
        sub_group: "General".into(),
        is_global: false,
        is_process_global: false,
        listens_to_timeouts: false,
        is_local_integrity: false,
        is_reduction: false,
        is_continuous: false,
        is_added_automagically: false,
        dependencies: vec![],
        supported_reductions: vec![],
        analyses: vec![],
        creates: vec![],
    };
    let result = t.model.register_module(duplicate);
    assert!(matches!(result, Err(WeaverError::ConstraintViolation(_))));
}

#[test]
fn call_uids_are_assigned_in_registration_order() {
    let mut t = TestModel::new();
    let a = t.call_with_scalars("A", &[]);
    let b = t.call_with_scalars("B", &[]);
    assert!(t.model.call(a).unique_id < t.model.call(b).unique_id);
}
