// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! End-to-end taint analysis scenarios over programmatically built IR.

mod common;

use taintflow::graph::flow_graph::FlowNode;
use taintflow::ir::{DispatchMode, Stmt};
use taintflow::pta::heap::TAINT_DESC;
use taintflow::pta::plugin::RESULT;
use taintflow::taint::config::TaintConfig;
use taintflow::taint::{analyze, SinkPoint, SourcePoint};
use taintflow::util::options::AnalysisOptions;

use common::{base_program, init_logger};

#[test]
fn direct_flow_from_source_to_sink() {
    init_logger();
    let (mut p, _object, v) = base_program();
    let t = p.add_class("T", None);
    let source_m = p.add_method(t, "source", &[], Some(v));
    p.set_static(source_m);
    let sink_m = p.add_method(t, "sink", &[v], None);
    p.set_static(sink_m);

    let main_m = p.add_method(t, "main", &[], None);
    p.set_static(main_m);
    let a = p.add_var(main_m, "a", v);
    let source_ref = p.method_ref_of(source_m);
    let sink_ref = p.method_ref_of(sink_m);
    let source_call = p.new_invoke(main_m, DispatchMode::Static, source_ref, None, vec![], Some(a));
    let sink_call = p.new_invoke(main_m, DispatchMode::Static, sink_ref, None, vec![a], None);
    p.set_body(main_m, vec![Stmt::Invoke(source_call), Stmt::Invoke(sink_call)]);
    p.add_entry_point(main_m);

    let config = TaintConfig::parse_str(
        r#"
sources:
  - { kind: call, method: "<T: V source()>", index: "result", type: "V" }
sinks:
  - { method: "<T: void sink(V)>", index: "0" }
"#,
        &p,
    )
    .unwrap();

    let result = analyze(p, AnalysisOptions::default(), config).unwrap();
    assert_eq!(result.taint_flows.len(), 1);
    let flow = result.taint_flows.iter().next().unwrap();
    assert_eq!(
        flow.source,
        SourcePoint::Call {
            invoke: source_call,
            index: RESULT
        }
    );
    assert_eq!(
        flow.sink,
        SinkPoint {
            invoke: sink_call,
            index: 0
        }
    );
    // the sink variable is a sink node of the taint flow graph
    assert!(result.tfg.sink_nodes().contains(&FlowNode::Var(a)));
    assert!(result.tfg.source_nodes().contains(&FlowNode::Var(a)));
}

#[test]
fn transfer_through_a_wrapper() {
    init_logger();
    let (mut p, object, v) = base_program();
    let w = p.add_class("W", Some(object));
    let t = p.add_class("T", None);
    let source_m = p.add_method(t, "source", &[], Some(v));
    p.set_static(source_m);
    let wrap_m = p.add_method(t, "wrap", &[v], Some(w));
    p.set_static(wrap_m);
    let sink_m = p.add_method(t, "sink", &[w], None);
    p.set_static(sink_m);

    let main_m = p.add_method(t, "main", &[], None);
    p.set_static(main_m);
    let s = p.add_var(main_m, "s", v);
    let wrapped = p.add_var(main_m, "w", w);
    let source_ref = p.method_ref_of(source_m);
    let wrap_ref = p.method_ref_of(wrap_m);
    let sink_ref = p.method_ref_of(sink_m);
    let source_call = p.new_invoke(main_m, DispatchMode::Static, source_ref, None, vec![], Some(s));
    let wrap_call = p.new_invoke(
        main_m,
        DispatchMode::Static,
        wrap_ref,
        None,
        vec![s],
        Some(wrapped),
    );
    let sink_call = p.new_invoke(main_m, DispatchMode::Static, sink_ref, None, vec![wrapped], None);
    p.set_body(
        main_m,
        vec![
            Stmt::Invoke(source_call),
            Stmt::Invoke(wrap_call),
            Stmt::Invoke(sink_call),
        ],
    );
    p.add_entry_point(main_m);

    let config = TaintConfig::parse_str(
        r#"
sources:
  - { kind: call, method: "<T: V source()>", index: "result", type: "V" }
transfers:
  - { method: "<T: W wrap(V)>", from: "0", to: "result", type: "W" }
sinks:
  - { method: "<T: void sink(W)>", index: "0" }
"#,
        &p,
    )
    .unwrap();

    let result = analyze(p, AnalysisOptions::default(), config).unwrap();
    assert_eq!(result.taint_flows.len(), 1);
    let flow = result.taint_flows.iter().next().unwrap();
    assert_eq!(
        flow.source,
        SourcePoint::Call {
            invoke: source_call,
            index: RESULT
        }
    );
    assert_eq!(flow.sink.invoke, sink_call);
    // the taint observed at the sink carries the rewritten type
    let heap = result.pta.heap();
    let at_sink: Vec<_> = result
        .pta
        .points_to(wrapped)
        .iter()
        .filter(|obj| heap.is_mock(**obj, TAINT_DESC))
        .collect();
    assert_eq!(at_sink.len(), 1);
    assert_eq!(heap.obj_ty(*at_sink[0]), w);
}

#[test]
fn sanitizer_cuts_the_flow() {
    init_logger();
    let (mut p, _object, v) = base_program();
    let t = p.add_class("T", None);
    let source_m = p.add_method(t, "source", &[], Some(v));
    p.set_static(source_m);
    let sanitize_m = p.add_method(t, "sanitize", &[v], Some(v));
    p.set_static(sanitize_m);
    let sanitize_param = p.method(sanitize_m).params[0];
    p.set_body(
        sanitize_m,
        vec![Stmt::Return {
            value: Some(sanitize_param),
        }],
    );
    let sink_m = p.add_method(t, "sink", &[v], None);
    p.set_static(sink_m);

    let main_m = p.add_method(t, "main", &[], None);
    p.set_static(main_m);
    let s = p.add_var(main_m, "s", v);
    let clean = p.add_var(main_m, "clean", v);
    let source_ref = p.method_ref_of(source_m);
    let sanitize_ref = p.method_ref_of(sanitize_m);
    let sink_ref = p.method_ref_of(sink_m);
    let source_call = p.new_invoke(main_m, DispatchMode::Static, source_ref, None, vec![], Some(s));
    let sanitize_call = p.new_invoke(
        main_m,
        DispatchMode::Static,
        sanitize_ref,
        None,
        vec![s],
        Some(clean),
    );
    let sink_call = p.new_invoke(main_m, DispatchMode::Static, sink_ref, None, vec![clean], None);
    p.set_body(
        main_m,
        vec![
            Stmt::Invoke(source_call),
            Stmt::Invoke(sanitize_call),
            Stmt::Invoke(sink_call),
        ],
    );
    p.add_entry_point(main_m);

    let yaml = r#"
sources:
  - { kind: call, method: "<T: V source()>", index: "result", type: "V" }
sanitizers:
  - { method: "<T: V sanitize(V)>", index: "0" }
sinks:
  - { method: "<T: void sink(V)>", index: "0" }
"#;
    let config = TaintConfig::parse_str(yaml, &p).unwrap();
    let result = analyze(p, AnalysisOptions::default(), config).unwrap();
    // the only path to the sink goes through the sanitized formal
    assert!(result.taint_flows.is_empty());
    // no taint is ever observed on the sanitized formal
    let heap = result.pta.heap();
    assert!(result
        .pta
        .points_to(sanitize_param)
        .iter()
        .all(|obj| !heap.is_mock(*obj, TAINT_DESC)));
}

#[test]
fn sanitizer_does_not_claim_path_sensitivity() {
    init_logger();
    let (mut p, _object, v) = base_program();
    let t = p.add_class("T", None);
    let source_m = p.add_method(t, "source", &[], Some(v));
    p.set_static(source_m);
    let sanitize_m = p.add_method(t, "sanitize", &[v], None);
    p.set_static(sanitize_m);
    let sink_m = p.add_method(t, "sink", &[v], None);
    p.set_static(sink_m);

    // s is passed to the sink directly, bypassing the sanitized formal
    let main_m = p.add_method(t, "main", &[], None);
    p.set_static(main_m);
    let s = p.add_var(main_m, "s", v);
    let source_ref = p.method_ref_of(source_m);
    let sanitize_ref = p.method_ref_of(sanitize_m);
    let sink_ref = p.method_ref_of(sink_m);
    let source_call = p.new_invoke(main_m, DispatchMode::Static, source_ref, None, vec![], Some(s));
    let sanitize_call =
        p.new_invoke(main_m, DispatchMode::Static, sanitize_ref, None, vec![s], None);
    let sink_call = p.new_invoke(main_m, DispatchMode::Static, sink_ref, None, vec![s], None);
    p.set_body(
        main_m,
        vec![
            Stmt::Invoke(source_call),
            Stmt::Invoke(sanitize_call),
            Stmt::Invoke(sink_call),
        ],
    );
    p.add_entry_point(main_m);

    let yaml = r#"
sources:
  - { kind: call, method: "<T: V source()>", index: "result", type: "V" }
sanitizers:
  - { method: "<T: void sanitize(V)>", index: "0" }
sinks:
  - { method: "<T: void sink(V)>", index: "0" }
"#;
    let config = TaintConfig::parse_str(yaml, &p).unwrap();
    let result = analyze(p, AnalysisOptions::default(), config).unwrap();
    assert_eq!(result.taint_flows.len(), 1);
}

#[test]
fn back_propagation_through_an_aliased_field() {
    init_logger();
    let (mut p, _object, v) = base_program();
    let c_class = p.add_class("C", None);
    let f = p.add_field(c_class, "f", v);
    let t = p.add_class("T", None);
    let source_m = p.add_method(t, "source", &[], Some(v));
    p.set_static(source_m);
    let append_m = p.add_method(c_class, "append", &[v], None);
    let sink_m = p.add_method(t, "sink", &[v], None);
    p.set_static(sink_m);

    let main_m = p.add_method(t, "main", &[], None);
    p.set_static(main_m);
    let c = p.add_var(main_m, "c", c_class);
    let s = p.add_var(main_m, "s", v);
    let loaded = p.add_var(main_m, "loaded", v);
    let source_ref = p.method_ref_of(source_m);
    let append_ref = p.method_ref_of(append_m);
    let sink_ref = p.method_ref_of(sink_m);
    let source_call = p.new_invoke(main_m, DispatchMode::Static, source_ref, None, vec![], Some(s));
    let append_call = p.new_invoke(
        main_m,
        DispatchMode::Virtual,
        append_ref,
        Some(c),
        vec![s],
        None,
    );
    let sink_call = p.new_invoke(main_m, DispatchMode::Static, sink_ref, None, vec![loaded], None);
    p.set_body(
        main_m,
        vec![
            Stmt::New { lhs: c, ty: c_class },
            Stmt::Invoke(source_call),
            Stmt::LoadField {
                lhs: loaded,
                base: Some(c),
                field: f,
            },
            Stmt::Invoke(append_call),
            Stmt::Invoke(sink_call),
        ],
    );
    p.add_entry_point(main_m);

    let yaml = r#"
sources:
  - { kind: call, method: "<T: V source()>", index: "result", type: "V" }
transfers:
  - { method: "<C: void append(V)>", from: "0", to: "base", type: "V" }
sinks:
  - { method: "<T: void sink(V)>", index: "0" }
"#;
    let config = TaintConfig::parse_str(yaml, &p).unwrap();

    // without back-propagation the aliased field never becomes tainted
    let mut no_back_prop = AnalysisOptions::default();
    no_back_prop.enable_back_propagate = false;
    let result = analyze(p.clone(), no_back_prop, config.clone()).unwrap();
    assert!(result.taint_flows.is_empty());

    let result = analyze(p, AnalysisOptions::default(), config).unwrap();
    assert_eq!(result.taint_flows.len(), 1);
    let flow = result.taint_flows.iter().next().unwrap();
    assert_eq!(
        flow.source,
        SourcePoint::Call {
            invoke: source_call,
            index: RESULT
        }
    );
    assert_eq!(flow.sink.invoke, sink_call);
}

#[test]
fn tfg_prunes_flows_that_miss_every_sink() {
    init_logger();
    let (mut p, _object, v) = base_program();
    let d_class = p.add_class("D", None);
    let g = p.add_field(d_class, "g", v);
    let t = p.add_class("T", None);
    let source_m = p.add_method(t, "source", &[], Some(v));
    p.set_static(source_m);
    let sink_m = p.add_method(t, "sink", &[v], None);
    p.set_static(sink_m);

    let main_m = p.add_method(t, "main", &[], None);
    p.set_static(main_m);
    let s1 = p.add_var(main_m, "s1", v);
    let s2 = p.add_var(main_m, "s2", v);
    let dead = p.add_var(main_m, "dead", d_class);
    let source_ref = p.method_ref_of(source_m);
    let sink_ref = p.method_ref_of(sink_m);
    let source_call1 =
        p.new_invoke(main_m, DispatchMode::Static, source_ref, None, vec![], Some(s1));
    let source_call2 =
        p.new_invoke(main_m, DispatchMode::Static, source_ref, None, vec![], Some(s2));
    let sink_call = p.new_invoke(main_m, DispatchMode::Static, sink_ref, None, vec![s1], None);
    p.set_body(
        main_m,
        vec![
            Stmt::Invoke(source_call1),
            Stmt::Invoke(source_call2),
            Stmt::New {
                lhs: dead,
                ty: d_class,
            },
            Stmt::StoreField {
                base: Some(dead),
                field: g,
                rhs: s2,
            },
            Stmt::Invoke(sink_call),
        ],
    );
    p.add_entry_point(main_m);

    let yaml = r#"
sources:
  - { kind: call, method: "<T: V source()>", index: "result", type: "V" }
sinks:
  - { method: "<T: void sink(V)>", index: "0" }
"#;
    let config = TaintConfig::parse_str(yaml, &p).unwrap();
    let result = analyze(p, AnalysisOptions::default(), config).unwrap();

    assert_eq!(result.taint_flows.len(), 1);
    let tfg = &result.tfg;
    assert!(tfg.source_nodes().contains(&FlowNode::Var(s1)));
    assert!(!tfg.source_nodes().contains(&FlowNode::Var(s2)));
    assert!(!tfg.contains_node(FlowNode::Var(s2)));
    // every retained node reaches some sink
    for node in tfg.nodes() {
        assert!(tfg.reaches_sink(node), "{node:?} cannot reach a sink");
    }
}
