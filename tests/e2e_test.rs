mod common;
mod utils;

use anyhow::Result;
use common::TestEnvironment;
use serde_json::Value;

fn event_data(stdout: &str, code: &str) -> Result<Value> {
    let events = utils::json_events(stdout)?;
    events
        .into_iter()
        .find(|event| event["code"] == code)
        .map(|event| event["data"].clone())
        .ok_or_else(|| anyhow::anyhow!("no {} event in output:\n{}", code, stdout))
}

fn mapping_for<'a>(data: &'a Value, dependency: &str) -> Option<&'a Value> {
    data.as_array()?
        .iter()
        .find(|entry| entry["dependency"] == dependency)
        .map(|entry| &entry["mapping"])
}

#[tokio::test]
async fn test_help_lists_subcommands() -> Result<()> {
    let env = TestEnvironment::new()?;
    let output = utils::run_dankinstall_command(&env, &["--help"])?;
    assert_eq!(output.exit_code, 0, "help failed: {}", output.stderr);
    for subcommand in ["distros", "detect", "mapping", "install", "configure", "config"] {
        assert!(
            output.stdout.contains(subcommand),
            "help does not mention {}:\n{}",
            subcommand,
            output.stdout
        );
    }
    Ok(())
}

#[tokio::test]
async fn test_distros_lists_every_family() -> Result<()> {
    let env = TestEnvironment::new()?;
    let output = utils::run_dankinstall_command(&env, &["--output", "json", "distros"])?;
    assert_eq!(output.exit_code, 0, "distros failed: {}", output.stderr);

    let data = event_data(&output.stdout, "distros.list")?;
    let entries = data.as_array().expect("distros data is a list");
    let ids: Vec<&str> = entries.iter().filter_map(|e| e["id"].as_str()).collect();
    for id in ["arch", "fedora", "debian", "ubuntu", "opensuse-tumbleweed", "nixos"] {
        assert!(ids.contains(&id), "{} missing from {:?}", id, ids);
    }

    let leap = entries
        .iter()
        .find(|e| e["id"] == "opensuse-leap")
        .expect("leap is registered");
    assert_eq!(leap["color"], "#73BA25");
    assert_eq!(leap["family"], "Suse");
    Ok(())
}

#[tokio::test]
async fn test_distros_text_table() -> Result<()> {
    let env = TestEnvironment::new()?;
    let output = utils::run_dankinstall_command(&env, &["distros"])?;
    assert_eq!(output.exit_code, 0, "distros failed: {}", output.stderr);
    assert!(output.stdout.contains("opensuse-slowroll"));
    assert!(output.stdout.contains("#73BA25"));
    Ok(())
}

#[tokio::test]
async fn test_mapping_for_tumbleweed_niri() -> Result<()> {
    let env = TestEnvironment::new()?;
    let output = utils::run_dankinstall_command(
        &env,
        &["--output", "json", "mapping", "--distro", "opensuse-tumbleweed", "--wm", "niri"],
    )?;
    assert_eq!(output.exit_code, 0, "mapping failed: {}", output.stderr);

    let data = event_data(&output.stdout, "mapping.list")?;
    let niri = mapping_for(&data, "niri").expect("niri is mapped");
    assert_eq!(niri["name"], "niri");
    assert_eq!(niri["repository"], "System");

    let quickshell = mapping_for(&data, "quickshell").expect("quickshell is mapped");
    assert_eq!(quickshell["repository"], "ThirdParty");
    assert_eq!(quickshell["repo_url"], "home:AvengeMedia:danklinux");

    assert!(mapping_for(&data, "hyprctl").is_none());
    Ok(())
}

#[tokio::test]
async fn test_mapping_git_flag_switches_variant() -> Result<()> {
    let env = TestEnvironment::new()?;
    let output = utils::run_dankinstall_command(
        &env,
        &[
            "--output", "json", "mapping", "--distro", "opensuse-tumbleweed", "--wm", "niri",
            "--git", "niri",
        ],
    )?;
    assert_eq!(output.exit_code, 0, "mapping failed: {}", output.stderr);

    let data = event_data(&output.stdout, "mapping.list")?;
    let niri = mapping_for(&data, "niri").expect("niri is mapped");
    assert_eq!(niri["name"], "niri-git");
    assert_eq!(niri["repository"], "ThirdParty");
    Ok(())
}

#[tokio::test]
async fn test_mapping_unknown_distro_fails() -> Result<()> {
    let env = TestEnvironment::new()?;
    let output = utils::run_dankinstall_command(&env, &["mapping", "--distro", "plan9"])?;
    assert_ne!(output.exit_code, 0);
    assert!(
        output.stderr.contains("unsupported distribution: plan9"),
        "unexpected stderr: {}",
        output.stderr
    );
    Ok(())
}

#[tokio::test]
async fn test_config_init_then_show() -> Result<()> {
    let env = TestEnvironment::new()?;
    let output = utils::run_dankinstall_command(&env, &["config", "init"])?;
    assert_eq!(output.exit_code, 0, "config init failed: {}", output.stderr);
    assert!(env.config_file().exists());

    let output = utils::run_dankinstall_command(&env, &["config", "init"])?;
    assert_ne!(output.exit_code, 0, "second init should refuse to overwrite");
    assert!(output.stderr.contains("--force"));

    std::fs::write(env.config_file(), "window_manager = \"hyprland\"\n")?;
    let output = utils::run_dankinstall_command(&env, &["config", "show"])?;
    assert_eq!(output.exit_code, 0, "config show failed: {}", output.stderr);
    assert!(output.stdout.contains("window_manager = \"hyprland\""));
    assert!(output.stdout.contains("queue_capacity = 64"));
    Ok(())
}

#[tokio::test]
async fn test_configure_hyprland_writes_session_files() -> Result<()> {
    let env = TestEnvironment::new()?;
    let output = utils::run_dankinstall_command(
        &env,
        &["configure", "--wm", "hyprland", "--terminal", "kitty"],
    )?;
    assert_eq!(output.exit_code, 0, "configure failed: {}", output.stderr);

    let environment = std::fs::read_to_string(env.config_home().join("environment.d/90-dms.conf"))?;
    assert!(environment.starts_with("TERMINAL=kitty\n"));

    let hyprland = std::fs::read_to_string(env.config_home().join("hypr/hyprland.conf"))?;
    assert!(hyprland.contains("exec-once = dms run"));

    let output = utils::run_dankinstall_command(
        &env,
        &["configure", "--wm", "hyprland", "--terminal", "kitty"],
    )?;
    assert_eq!(output.exit_code, 0);
    let hyprland = std::fs::read_to_string(env.config_home().join("hypr/hyprland.conf"))?;
    assert_eq!(hyprland.matches("exec-once = dms run").count(), 1);
    Ok(())
}
