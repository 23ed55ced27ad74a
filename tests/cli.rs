use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

const COMPONENT: &str = "tests/fixtures/component.yaml";
const BINDING: &str = "tests/fixtures/binding.yaml";
const ENVIRONMENT: &str = "tests/fixtures/environment.yaml";

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("gitops-generator").unwrap();
    cmd.env("GITOPS_LOG", "off");
    cmd
}

#[test]
fn base_writes_manifests() {
    let dir = tempfile::tempdir().unwrap();
    cli()
        .args(["base", "--component", COMPONENT, "--output"])
        .arg(dir.path())
        .assert()
        .success();

    for file in ["deployment.yaml", "service.yaml", "route.yaml", "kustomization.yaml"] {
        assert!(dir.path().join(file).exists(), "missing {file}");
    }
    let deployment = std::fs::read_to_string(dir.path().join("deployment.yaml")).unwrap();
    assert!(deployment.contains("app.kubernetes.io/created-by: application-service"));
}

#[test]
fn creator_tag_from_environment() {
    let dir = tempfile::tempdir().unwrap();
    cli()
        .env("GITOPS_CREATOR_TAG", "my-operator")
        .args(["base", "--component", COMPONENT, "--output"])
        .arg(dir.path())
        .assert()
        .success();

    let deployment = std::fs::read_to_string(dir.path().join("deployment.yaml")).unwrap();
    assert!(deployment.contains("app.kubernetes.io/created-by: my-operator"));
}

#[test]
fn build_writes_webhook_triad() {
    let dir = tempfile::tempdir().unwrap();
    cli()
        .args(["build", "--component", COMPONENT, "--registry-secret", "--output"])
        .arg(dir.path())
        .assert()
        .success();

    let template = std::fs::read_to_string(dir.path().join("trigger-template.yaml")).unwrap();
    assert!(template.contains("quay.io/test/test-image:latest-$(tt.params.git-revision)"));
    assert!(template.contains("redhat-appstudio-registry-pull-secret"));
    assert!(dir.path().join("event-listener.yaml").exists());
}

#[test]
fn overlay_and_parent() {
    let dir = tempfile::tempdir().unwrap();
    let overlay = dir.path().join("components/test-component/overlays/staging");
    cli()
        .args([
            "overlay",
            "--binding",
            BINDING,
            "--environment",
            ENVIRONMENT,
            "--component-name",
            "test-component",
            "--image",
            "quay.io/test/test-image:v2",
            "--output",
        ])
        .arg(&overlay)
        .assert()
        .success();
    assert!(overlay.join("deployment-patch.yaml").exists());

    cli()
        .args(["parent", "--pvc-namespace", "test-namespace", "--app-root"])
        .arg(dir.path())
        .assert()
        .success();
    let parent = std::fs::read_to_string(dir.path().join("kustomization.yaml")).unwrap();
    assert!(parent.contains("components/test-component"));
    assert!(parent.contains("common-storage-pvc.yaml"));
}

#[test]
fn overlay_unknown_component() {
    let dir = tempfile::tempdir().unwrap();
    cli()
        .args([
            "overlay",
            "--binding",
            BINDING,
            "--environment",
            ENVIRONMENT,
            "--component-name",
            "missing",
            "--image",
            "quay.io/test/test-image:v2",
            "--output",
        ])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("not part of the binding"));
}

#[test]
fn push_dry_run_prints_script() {
    cli()
        .args([
            "push",
            "--component",
            COMPONENT,
            "--remote",
            "https://github.com/org/gitops",
            "--branch",
            "staging",
            "--dry-run",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("set -euo pipefail"))
        .stdout(predicate::str::contains("git clone"))
        .stdout(predicate::str::contains("github.com/org/gitops"))
        .stdout(predicate::str::contains("git push origin staging"))
        .stdout(predicate::str::contains(
            "'Generate GitOps base resources for component test-component'",
        ));
}

#[test]
fn push_dry_run_hides_token() {
    cli()
        .env("GITOPS_TOKEN", "ghp_SECRET")
        .args([
            "push",
            "--component",
            COMPONENT,
            "--remote",
            "https://github.com/org/gitops",
            "--dry-run",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("github.com/org/gitops"))
        .stdout(predicate::str::contains("ghp_SECRET").not());
}

#[test]
fn push_rejects_unknown_remote() {
    cli()
        .args([
            "push",
            "--component",
            COMPONENT,
            "--remote",
            "https://example.com/org/gitops",
            "--dry-run",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("https://github.com/"));
}

#[test]
fn remove_dry_run() {
    cli()
        .args([
            "remove",
            "--component-name",
            "web",
            "--remote",
            "https://gitlab.com/org/gitops",
            "--dry-run",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("rm -rf components/web"))
        .stdout(predicate::str::contains("'Removed component web'"));
}

#[test]
fn init_prints_plan() {
    cli()
        .args([
            "init",
            "--component",
            COMPONENT,
            "--remote",
            "https://github.com/org/gitops",
            "--login",
            "org",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("create repository \"gitops\" owned by User"))
        .stdout(predicate::str::contains("git push -u origin main"));
}
