//! End-to-End Generation Tests
//!
//! Drive the whole weave over small specification fixtures and check the
//! emitted documents: record round-trips between wrapper and receival
//! inputs, the reduction guard, stable byte-identical re-emission, and that
//! a failing run leaves no documents behind.

use std::fs;
use std::path::{Path, PathBuf};

use tbon_weaver::config::WeaverConfig;
use tbon_weaver::driver::{self, WeaverArgs};
use tbon_weaver::readers::{parse_document, SpecNode};

const GTI_SPEC: &str = r#"<gti-specification>
  <enums>
    <enum name="modes"><entry>eager</entry><entry>rendezvous</entry></enum>
  </enums>
  <protocols>
    <protocol name="tcp" supports-intra="yes">
      <module module-name="protTcp" config-name="ProtTcp" instance-type="I_Protocol"
              header-name="i_protocol.h" include-dir="gti/protocols"/>
      <settings>
        <setting name="buffer_size" type="integer" min="1" max="65536" default="1024"/>
        <setting name="mode" type="enum" list="modes" default="eager"/>
      </settings>
    </protocol>
  </protocols>
  <strategies>
    <strategy name="buffered" kind="inter">
      <up module-name="stratBufferedUp" config-name="StratBufferedUp"/>
      <down module-name="stratBufferedDown" config-name="StratBufferedDown"/>
    </strategy>
    <strategy name="ring" kind="intra">
      <module module-name="stratRing" config-name="StratRing"/>
    </strategy>
  </strategies>
  <places>
    <place name="tool_place" kind="executable" command="gti_place"/>
  </places>
</gti-specification>
"#;

const ANALYSIS_SPEC: &str = r#"<analysis-specification group="checks" include-path="modules/checks">
  <operations>
    <operation name="ResolveComm" return-type="CommInfo">
      <inputs><input name="comm" type="int"/></inputs>
      <headers><header>comm_resolution.h</header></headers>
      <source>$R = resolveComm($0);</source>
      <cleanup>releaseComm($R);</cleanup>
    </operation>
  </operations>
  <modules>
    <module name="SendLogger" module-name="modSendLogger" config-name="SendLogger"
            instance-type="I_SendLogger" header-name="i_send_logger.h" include-dir="modules/checks">
      <analyses>
        <analysis function="logSend">
          <inputs><input name="dest" type="int"/><input name="count" type="int"/></inputs>
        </analysis>
      </analyses>
    </module>
    <module name="RecvMatcher" module-name="modRecvMatcher" config-name="RecvMatcher"
            instance-type="I_RecvMatcher" header-name="i_recv_matcher.h" include-dir="modules/checks">
      <analyses>
        <analysis function="matchRecv">
          <inputs><input name="src" type="int"/><input name="info" type="CommInfo"/></inputs>
        </analysis>
      </analyses>
    </module>
    <module name="SendCounter" module-name="modSendCounter" config-name="SendCounter"
            instance-type="I_SendCounter" header-name="i_send_counter.h" include-dir="modules/checks"
            reduction="yes">
      <analyses>
        <analysis function="countSends">
          <inputs><input name="dest" type="int"/></inputs>
        </analysis>
      </analyses>
    </module>
  </modules>
</analysis-specification>
"#;

const API_SPEC: &str = r#"<api-specification group="ExampleApi" api-header="example_api.h">
  <calls>
    <call name="Send" return-type="int">
      <arguments>
        <argument name="dest" type="int" intent="in"/>
        <argument name="count" type="int" intent="in"/>
        <argument name="tag" type="int" intent="in"/>
      </arguments>
      <analyses>
        <analysis function="logSend" group="checks" order="pre">
          <inputs>
            <input type="argument" name="dest"/>
            <input type="argument" name="count"/>
          </inputs>
        </analysis>
        <analysis function="countSends" group="checks" order="pre" reduction="yes" intra-call-order="1">
          <inputs><input type="argument" name="dest"/></inputs>
        </analysis>
      </analyses>
    </call>
    <call name="Recv" return-type="int">
      <arguments>
        <argument name="src" type="int" intent="in"/>
        <argument name="comm" type="int" intent="in"/>
      </arguments>
      <operations>
        <operation name="ResolveComm" group="checks" order="pre">
          <inputs><input type="argument" name="comm"/></inputs>
        </operation>
      </operations>
      <analyses>
        <analysis function="matchRecv" group="checks" order="pre">
          <inputs>
            <input type="argument" name="src"/>
            <input type="operation" name="ResolveComm" group="checks" mapping-id="0"/>
          </inputs>
        </analysis>
      </analyses>
    </call>
  </calls>
</api-specification>
"#;

const LAYOUT_SPEC: &str = r#"<layout-specification>
  <default-communication strategy="buffered" protocol="tcp"/>
  <levels>
    <level order="0" size="16"/>
    <level order="1" size="4" place="tool_place">
      <analyses>
        <analysis-module name="SendLogger"/>
        <analysis-module name="RecvMatcher"/>
        <analysis-module name="SendCounter"/>
      </analyses>
    </level>
    <level order="2" size="1" place="tool_place">
      <analyses>
        <analysis-module name="SendLogger"/>
        <analysis-module name="SendCounter"/>
      </analyses>
    </level>
  </levels>
  <connections>
    <connection from="0" to="1"/>
    <connection from="1" to="2"/>
  </connections>
</layout-specification>
"#;

const MERGED_LAYOUT_SPEC: &str = r#"<layout-specification>
  <default-communication strategy="buffered" protocol="tcp"/>
  <levels>
    <level order="0" size="16"/>
    <level order="1" size="4" place="tool_place">
      <analyses>
        <analysis-module name="SendLogger"/>
        <analysis-module name="RecvMatcher"/>
        <analysis-module name="SendCounter"/>
      </analyses>
    </level>
    <level order="2" size="1" place="tool_place">
      <analyses>
        <analysis-module name="SendLogger"/>
      </analyses>
    </level>
  </levels>
  <connections>
    <connection from="0" to="1"/>
    <connection from="1" to="2"/>
  </connections>
  <merges>
    <merge higher="2" lower="1"/>
    <merge higher="1" lower="0"/>
  </merges>
</layout-specification>
"#;

const CYCLIC_LAYOUT_SPEC: &str = r#"<layout-specification>
  <default-communication strategy="buffered" protocol="tcp"/>
  <levels>
    <level order="0" size="16"/>
    <level order="1" size="4" place="tool_place"/>
    <level order="2" size="1" place="tool_place"/>
  </levels>
  <connections>
    <connection from="0" to="1"/>
    <connection from="1" to="2"/>
    <connection from="2" to="1"/>
  </connections>
</layout-specification>
"#;

struct Fixture {
    _dir: tempfile::TempDir,
    args: WeaverArgs,
    output_dir: PathBuf,
}

fn fixture(layout: &str) -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let write = |name: &str, content: &str| -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).expect("write fixture");
        path
    };
    let layout_path = write("layout.xml", layout);
    let gti_path = write("gti.xml", GTI_SPEC);
    let analysis_path = write("analysis.xml", ANALYSIS_SPEC);
    let api_path = write("api.xml", API_SPEC);
    let output_dir = dir.path().join("out");
    Fixture {
        args: WeaverArgs {
            layout: layout_path,
            gti: gti_path,
            specs: vec![api_path, analysis_path],
        },
        output_dir,
        _dir: dir,
    }
}

fn config_for(output_dir: &Path) -> WeaverConfig {
    WeaverConfig {
        verbosity: 0,
        output_dir: output_dir.to_path_buf(),
        emit_dot: Some(false),
    }
}

fn load_doc(path: &Path) -> SpecNode {
    let text = fs::read_to_string(path).expect("read emitted document");
    parse_document(&text, &path.display().to_string()).expect("parse emitted document")
}

/// Element names of a `<record>` node
fn record_element_names(record: &SpecNode) -> Vec<String> {
    record
        .children_named("element")
        .map(|e| e.attr("name").unwrap_or_default().to_string())
        .collect()
}

/// The args packed by a wrapper record equal the args consumed by the
/// matching receival dispatch handler, per uid.
#[test]
fn records_round_trip_between_wrapper_and_receival() {
    let f = fixture(LAYOUT_SPEC);
    driver::run(&f.args, &config_for(&f.output_dir)).expect("weave");

    let wrapper = load_doc(&f.output_dir.join("weaver-wrapp-gen-input-0.xml"));
    let receival = load_doc(&f.output_dir.join("weaver-receival-gen-input-1.xml"));

    let mut wrapper_records = Vec::new();
    for call in wrapper.child("calls").expect("calls").children_named("call") {
        for exec in call.children_named("exec") {
            if let Some(record) = exec.child("record") {
                wrapper_records.push((
                    record.attr("uid").unwrap().to_string(),
                    record_element_names(record),
                ));
            }
        }
    }
    assert!(!wrapper_records.is_empty(), "the application layer emits records");

    let receival_records: Vec<(String, Vec<String>)> = receival
        .child("records")
        .expect("records")
        .children_named("record")
        .filter(|r| r.attr("from-level") == Some("0"))
        .map(|r| (r.attr("uid").unwrap().to_string(), record_element_names(r)))
        .collect();

    for (uid, elements) in &wrapper_records {
        let matching = receival_records
            .iter()
            .find(|(r_uid, _)| r_uid == uid)
            .unwrap_or_else(|| panic!("no dispatch handler for record uid {}", uid));
        assert_eq!(&matching.1, elements, "record {} shape differs", uid);
    }
}

/// The Recv record carries raw arguments; the tool layer materializes the
/// operation result itself before running its analysis.
#[test]
fn operation_results_never_travel() {
    let f = fixture(LAYOUT_SPEC);
    driver::run(&f.args, &config_for(&f.output_dir)).expect("weave");

    let wrapper = load_doc(&f.output_dir.join("weaver-wrapp-gen-input-0.xml"));
    let recv_call = wrapper
        .child("calls")
        .unwrap()
        .children_named("call")
        .find(|c| c.attr("name") == Some("Recv"))
        .expect("Recv is wrapped");
    let record = recv_call
        .children_named("exec")
        .find_map(|e| e.child("record"))
        .expect("Recv builds a record");
    let names = record_element_names(record);
    assert!(names.contains(&"src".to_string()));
    assert!(names.contains(&"comm".to_string()));
    assert!(
        !names.iter().any(|n| n.contains("ResolveComm")),
        "operation results must not be serialized: {:?}",
        names
    );

    // The receival side runs the operation before the analysis.
    let receival = load_doc(&f.output_dir.join("weaver-receival-gen-input-1.xml"));
    let recv_record = receival
        .child("records")
        .unwrap()
        .children_named("record")
        .find(|r| r.attr("call") == Some("Recv"))
        .expect("Recv record dispatched on layer 1");
    let exec = recv_record.child("exec").expect("exec block");
    let op = exec
        .children_named("operation")
        .find(|o| o.attr("name") == Some("ResolveComm"))
        .expect("ResolveComm runs on the receiving layer");
    assert_eq!(
        op.child("source").map(|s| s.text.trim().to_string()),
        Some("op_ResolveComm_0 = resolveComm(comm);".to_string())
    );
}

/// The wrapper guards reducible forwards.
#[test]
fn reduction_guard_appears_in_wrapper_input() {
    let f = fixture(LAYOUT_SPEC);
    driver::run(&f.args, &config_for(&f.output_dir)).expect("weave");

    let wrapper = load_doc(&f.output_dir.join("weaver-wrapp-gen-input-0.xml"));
    let send_call = wrapper
        .child("calls")
        .unwrap()
        .children_named("call")
        .find(|c| c.attr("name") == Some("Send"))
        .expect("Send is wrapped");

    assert!(
        send_call.child("avoid-reducible-forwards").is_some(),
        "the reduction guard must be wired for Send"
    );
    let forward = send_call
        .children_named("exec")
        .find_map(|e| e.child("forwarding"))
        .and_then(|fwd| fwd.child("forward"))
        .expect("Send forwards its record");
    assert_eq!(forward.attr("reducible"), Some("yes"));
}

/// Identical inputs produce byte-identical outputs.
#[test]
fn emission_is_stable() {
    let f = fixture(LAYOUT_SPEC);
    let config = config_for(&f.output_dir);

    let summary = driver::run(&f.args, &config).expect("first weave");
    let mut first = Vec::new();
    for path in &summary.outputs {
        first.push((path.clone(), fs::read(path).expect("read output")));
    }

    let summary = driver::run(&f.args, &config).expect("second weave");
    assert_eq!(first.len(), summary.outputs.len());
    for (path, bytes) in &first {
        let again = fs::read(path).expect("re-read output");
        assert_eq!(&again, bytes, "{} changed between runs", path.display());
    }
}

/// A cyclic layout aborts the run before any document is written.
#[test]
fn cyclic_layout_produces_no_outputs() {
    let f = fixture(CYCLIC_LAYOUT_SPEC);
    let result = driver::run(&f.args, &config_for(&f.output_dir));
    assert!(result.is_err());

    let leftovers: Vec<_> = match fs::read_dir(&f.output_dir) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    };
    assert!(
        leftovers.is_empty(),
        "failing weave must not write documents: {:?}",
        leftovers
    );
}

/// A merge chain declared top-down ((2 into 1) before (1 into 0)) lands
/// every layer in the final document: one `<level>` section per original
/// layer, instances keeping their originating layer id, and no separate
/// documents for the merged layers.
#[test]
fn merge_chain_collapses_into_one_document() {
    let f = fixture(MERGED_LAYOUT_SPEC);
    driver::run(&f.args, &config_for(&f.output_dir)).expect("weave");

    assert!(
        !f.output_dir.join("weaver-mod-conf-input-1.xml").exists(),
        "layer 1 merged away, it must not get its own document"
    );
    assert!(
        !f.output_dir.join("weaver-mod-conf-input-2.xml").exists(),
        "layer 2 merged away, it must not get its own document"
    );

    let doc = load_doc(&f.output_dir.join("weaver-mod-conf-input-0.xml"));
    let levels: Vec<&SpecNode> = doc
        .child("levels")
        .expect("levels")
        .children_named("level")
        .collect();
    let orders: Vec<&str> = levels
        .iter()
        .map(|l| l.attr("order").unwrap_or_default())
        .collect();
    assert_eq!(orders, ["0", "1", "2"], "every merged layer keeps a section");

    for level in levels {
        let order = level.attr("order").unwrap_or_default();
        let instances: Vec<&SpecNode> = level.children_named("instance").collect();
        assert!(
            !instances.is_empty(),
            "merged level {} lost its instances",
            order
        );
        for instance in &instances {
            assert_eq!(
                instance.attr("origin-level"),
                Some(order),
                "instance {} must keep its originating layer",
                instance.attr("id").unwrap_or_default()
            );
        }
        // The tool layers bring their analysis instances along.
        if order != "0" {
            assert!(
                instances
                    .iter()
                    .any(|i| i.attr("kind") == Some("analysis")
                        && i.attr("name") == Some("modSendLogger")),
                "level {} misses its analysis instances",
                order
            );
        }
    }
}

/// The module-configuration lists instances in the required order and wires
/// wrapper/receival instances to the analyses they call.
#[test]
fn module_config_orders_instances() {
    let f = fixture(LAYOUT_SPEC);
    driver::run(&f.args, &config_for(&f.output_dir)).expect("weave");

    let doc = load_doc(&f.output_dir.join("weaver-mod-conf-input-1.xml"));
    let level = doc
        .child("levels")
        .unwrap()
        .children_named("level")
        .find(|l| l.attr("order") == Some("1"))
        .expect("level 1 document");

    let kinds: Vec<&str> = level
        .children_named("instance")
        .map(|i| i.attr("kind").unwrap_or_default())
        .collect();
    let position = |kind: &str| kinds.iter().position(|k| *k == kind);

    let place = position("place").expect("place instance");
    let strategy = position("strategy").expect("strategy instance");
    let receival = position("receival").expect("receival instance");
    let analysis = position("analysis").expect("analysis instance");
    assert!(place < strategy && strategy < receival && receival < analysis);

    let receival_instance = level
        .children_named("instance")
        .find(|i| i.attr("kind") == Some("receival"))
        .unwrap();
    assert!(
        receival_instance.child("uses").is_some(),
        "the receival module references its analysis instances"
    );
}
