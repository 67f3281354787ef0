use std::fs;
use std::path::Path;

use labsync::lint::validate_references;
use labsync::loader::{LoadError, load_lab_config};
use labsync_api::LabResource;
use labsync_core::LabResources;

fn write(dir: &Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

const LAB_CONFIG: &str = r#"
sources:
  locations:
    - locations/*.yaml
  exporter_hosts:
    - hosts/*.yaml
  exporters:
    - exporters/*.yaml
  exporter_templates:
    - templates/*.yaml
  jumpstarter_instances:
    - instances/*.yaml
variables:
  - vars/lab.yaml
"#;

fn seed(dir: &Path) {
    write(dir, "jumpstarter-lab.yaml", LAB_CONFIG);
    write(dir, "vars/lab.yaml", "subnet: 10.20.0\nssh_user: root\n");
    write(
        dir,
        "locations/brno.yaml",
        "apiVersion: meta.jumpstarter.dev/v1alpha1\nkind: PhysicalLocation\nmetadata:\n  name: brno\nspec:\n  description: Brno lab\n",
    );
    write(
        dir,
        "hosts/host-a.yaml",
        r#"apiVersion: meta.jumpstarter.dev/v1alpha1
kind: ExporterHost
metadata:
  name: host-a
spec:
  locationRef:
    name: brno
  addresses:
    - $(var.subnet).10
  management:
    ssh:
      user: $(var.ssh_user)
      password: secret
"#,
    );
    write(
        dir,
        "exporters/rig-1.yaml",
        r#"apiVersion: meta.jumpstarter.dev/v1alpha1
kind: ExporterInstance
metadata:
  name: rig-1
spec:
  dutLocationRef:
    name: brno
  exporterHostRef:
    name: host-a
  jumpstarterInstanceRef:
    name: prod
  configTemplateRef:
    name: sidekick
"#,
    );
    write(
        dir,
        "templates/sidekick.yaml",
        r#"apiVersion: meta.jumpstarter.dev/v1alpha1
kind: ExporterConfigTemplate
metadata:
  name: sidekick
spec:
  exporterMetadata:
    name: $(name)
  configTemplate: |
    token: $(param.token)
"#,
    );
    write(
        dir,
        "instances/prod.yaml",
        r#"apiVersion: meta.jumpstarter.dev/v1alpha1
kind: JumpstarterInstance
metadata:
  name: prod
spec:
  endpoints:
    - grpc.lab:443
"#,
    );
}

#[test]
fn test_load_full_lab() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());

    let lab = load_lab_config(&dir.path().join("jumpstarter-lab.yaml"), None).unwrap();

    assert_eq!(lab.physical_locations.len(), 1);
    assert_eq!(lab.exporter_hosts().len(), 1);
    assert_eq!(lab.exporter_instances_for_host("host-a")[0].name(), "rig-1");
    assert!(lab.exporter_config_template("sidekick").is_some());
    assert_eq!(
        lab.jumpstarter_instance("prod").and_then(|ji| ji.primary_endpoint()),
        Some("grpc.lab:443")
    );
    assert_eq!(lab.variables.get("subnet").unwrap(), "10.20.0");
    assert_eq!(
        lab.source_file("ExporterInstance", "rig-1"),
        Some(&dir.path().join("exporters/rig-1.yaml"))
    );

    assert!(validate_references(&lab).is_ok());
}

#[test]
fn test_duplicate_names_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());
    write(
        dir.path(),
        "exporters/rig-1-copy.yaml",
        "apiVersion: meta.jumpstarter.dev/v1alpha1\nkind: ExporterInstance\nmetadata:\n  name: rig-1\n",
    );

    let err = load_lab_config(&dir.path().join("jumpstarter-lab.yaml"), None).unwrap_err();
    match err {
        LoadError::Duplicate { kind, name, .. } => {
            assert_eq!(kind, "ExporterInstance");
            assert_eq!(name, "rig-1");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_wrong_kind_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());
    write(
        dir.path(),
        "hosts/stray.yaml",
        "apiVersion: meta.jumpstarter.dev/v1alpha1\nkind: ExporterInstance\nmetadata:\n  name: stray\n",
    );

    let err = load_lab_config(&dir.path().join("jumpstarter-lab.yaml"), None).unwrap_err();
    assert!(matches!(err, LoadError::WrongKind { expected: "ExporterHost", ref found, .. } if found == "ExporterInstance"));
}

#[test]
fn test_missing_name_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());
    write(
        dir.path(),
        "templates/anonymous.yaml",
        "apiVersion: meta.jumpstarter.dev/v1alpha1\nkind: ExporterConfigTemplate\nspec:\n  configTemplate: x\n",
    );

    let err = load_lab_config(&dir.path().join("jumpstarter-lab.yaml"), None).unwrap_err();
    assert!(matches!(err, LoadError::MissingName { kind: "ExporterConfigTemplate", .. }));
}

#[test]
fn test_missing_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_lab_config(&dir.path().join("jumpstarter-lab.yaml"), None).unwrap_err();
    assert!(matches!(err, LoadError::Read { .. }));
}

#[test]
fn test_lint_reports_broken_reference() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());
    write(
        dir.path(),
        "exporters/rig-2.yaml",
        r#"apiVersion: meta.jumpstarter.dev/v1alpha1
kind: ExporterInstance
metadata:
  name: rig-2
spec:
  exporterHostRef:
    name: host-z
"#,
    );

    let lab = load_lab_config(&dir.path().join("jumpstarter-lab.yaml"), None).unwrap();
    let report = validate_references(&lab);

    assert_eq!(report.error_count(), 1);
    let file = dir.path().join("exporters/rig-2.yaml").display().to_string();
    assert_eq!(
        report.errors_by_file[&file],
        vec!["ExporterInstance rig-2 references non-existent exporter host host-z"]
    );
}
