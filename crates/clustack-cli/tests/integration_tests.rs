//! Integration tests for the clustack binary

use std::fs;
use std::path::Path;
use std::process::Command;

use serde_json::Value;
use tempfile::TempDir;

const CLUSTER: &str = r#"
clusterName: test-cluster
region: us-west-1
subnets:
- name: public1
  availabilityZone: us-west-1a
  instanceCIDR: 10.0.0.0/24
- name: private1
  private: true
  availabilityZone: us-west-1a
  instanceCIDR: 10.0.1.0/24
worker:
  nodePools:
  - name: pool1
    subnets: [private1]
"#;

/// Run clustack and capture (stdout, stderr, exit code)
fn clustack_output(args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_clustack"))
        .args(args)
        .env_remove("CLUSTACK_CONFIG")
        .env_remove("CLUSTACK_OUTPUT")
        .env_remove("CLUSTACK_PAYLOAD_DIR")
        .output()
        .expect("Failed to execute clustack");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.code().unwrap_or(-1))
}

fn write_config(dir: &TempDir, content: &str) -> String {
    let path = dir.path().join("cluster.yaml");
    fs::write(&path, content).unwrap();
    path.to_string_lossy().to_string()
}

fn read_stack(dir: &Path, name: &str) -> Value {
    let content = fs::read_to_string(dir.join(name).join("stack.json")).unwrap();
    serde_json::from_str(&content).unwrap()
}

#[test]
fn test_render_writes_every_stack() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, CLUSTER);
    let out = dir.path().join("out");

    let (stdout, stderr, code) =
        clustack_output(&["render", "-c", &config, "-o", out.to_str().unwrap()]);
    assert_eq!(code, 0, "stderr: {}", stderr);
    assert!(stdout.contains("Rendered 3 stack(s) for cluster test-cluster"));

    let root = read_stack(&out, "root");
    assert_eq!(root["Resources"]["Pool1"]["DependsOn"][0], "Controlplane");

    let control_plane = read_stack(&out, "control-plane");
    assert!(control_plane["Resources"]["Private1NatGateway"].is_object());
    assert!(control_plane["Outputs"]["SecurityGroupWorker"]["Export"].is_object());

    let pool = read_stack(&out, "pool1");
    assert_eq!(
        pool["Resources"]["Workers"]["Properties"]["VPCZoneIdentifier"][0],
        serde_json::json!({"Fn::ImportValue": {"Fn::Sub": "${ControlPlaneStackName}-Private1"}})
    );
}

#[test]
fn test_render_failure_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        r#"
clusterName: c
region: us-west-1
availabilityZone: us-west-1a
worker:
  nodePools:
  - name: pool1
    securityGroupIds: [sg-1, sg-2, sg-3, sg-4, sg-5]
"#,
    );
    let out = dir.path().join("out");

    let (_, stderr, code) =
        clustack_output(&["render", "-c", &config, "-o", out.to_str().unwrap()]);
    assert_eq!(code, 3);
    assert!(stderr.contains("but was 5"));
    assert!(!out.exists());
}

#[test]
fn test_validate_passes() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, CLUSTER);

    let (stdout, _, code) = clustack_output(&["validate", "-c", &config]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Validation passed, 3 stack(s) would be generated"));
}

#[test]
fn test_validate_json_reports_schema_error() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "clusterName: c\nregion: us-west-1\nworkerCont: 3\n");

    let (stdout, _, code) = clustack_output(&["validate", "-c", &config, "--json"]);
    assert_eq!(code, 2);

    let report: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["valid"], false);
    assert_eq!(report["errors"][0]["kind"], "schema");
}

#[test]
fn test_validate_reports_conflict() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        "clusterName: c\nregion: us-west-1\nvpcCIDR: 10.0.0.0/16\nvpc:\n  cidr: 10.0.0.0/16\n",
    );

    let (stdout, _, code) = clustack_output(&["validate", "-c", &config]);
    assert_eq!(code, 2);
    assert!(stdout.contains("Validation failed: 1 error(s)"));
}

#[test]
fn test_missing_config() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.yaml");

    let (_, stderr, code) = clustack_output(&["show", "-c", missing.to_str().unwrap()]);
    assert_eq!(code, 5);
    assert!(stderr.contains("Failed to read"));
}

#[test]
fn test_show_json_topology() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, CLUSTER);

    let (stdout, stderr, code) = clustack_output(&["show", "-c", &config, "--json"]);
    assert_eq!(code, 0, "stderr: {}", stderr);

    let topology: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(topology["clusterName"], "test-cluster");
    assert_eq!(topology["subnets"][1]["visibility"], "private");
    assert_eq!(
        topology["subnets"][1]["natGateway"]["hostSubnet"],
        "public1"
    );
}

#[test]
fn test_show_tree() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, CLUSTER);

    let (stdout, _, code) = clustack_output(&["show", "-c", &config]);
    assert_eq!(code, 0);
    assert!(stdout.contains("test-cluster (us-west-1)"));
    assert!(stdout.contains("NAT in public1 (managed EIP)"));
}

#[test]
fn test_payload_dir_override() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, CLUSTER);
    let payloads = dir.path().join("payloads");
    fs::create_dir(&payloads).unwrap();
    fs::write(
        payloads.join("etcd.j2"),
        "#cloud-config\n# custom etcd {{ request.etcd_node_name }} {{ volume_attach_max_attempts }}\n",
    )
    .unwrap();
    let out = dir.path().join("out");

    let (_, stderr, code) = clustack_output(&[
        "render",
        "-c",
        &config,
        "-o",
        out.to_str().unwrap(),
        "--payload-dir",
        payloads.to_str().unwrap(),
        "--volume-attach-max-attempts",
        "7",
    ]);
    assert_eq!(code, 0, "stderr: {}", stderr);

    let control_plane = read_stack(&out, "control-plane");
    let user_data = control_plane["Resources"]["Etcd0LC"]["Properties"]["UserData"]["Fn::Base64"]
        .as_str()
        .unwrap();
    assert!(user_data.starts_with("#cloud-config\n# custom etcd"));
    assert!(user_data.contains(" 7"));
}

#[test]
fn test_broken_payload_template() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, CLUSTER);
    let payloads = dir.path().join("payloads");
    fs::create_dir(&payloads).unwrap();
    fs::write(payloads.join("worker.j2"), "#cloud-config\n{{ request.missing }}\n").unwrap();

    let (_, _, code) = clustack_output(&[
        "validate",
        "-c",
        &config,
        "--payload-dir",
        payloads.to_str().unwrap(),
    ]);
    assert_eq!(code, 4);
}
