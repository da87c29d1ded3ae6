use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
        }
    }

    fn db_path(&self) -> PathBuf {
        self.xdg_data.join("chatloom/chatloom.db")
    }

    fn attachments_dir(&self) -> PathBuf {
        self.xdg_data.join("chatloom/attachments")
    }

    fn seed_file(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.home.join(name);
        fs::write(&path, contents).expect("failed to seed file");
        path
    }
}

fn run_cli(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("chatloom"));

    Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute chatloom: {e}"))
}

fn assert_success(args: &[&str], output: &Output) -> String {
    if output.status.success() {
        return String::from_utf8_lossy(&output.stdout).into_owned();
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "chatloom {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

/// Run and return captured stdout, panicking with full output on failure
fn cli(env: &CliTestEnv, args: &[&str]) -> String {
    let output = run_cli(env, args);
    assert_success(args, &output)
}

/// Parse "Created thread th_..." / "Added item it_..." style summaries
fn extract_id(stdout: &str, prefix: &str) -> String {
    stdout
        .split_whitespace()
        .find(|w| w.starts_with(prefix))
        .unwrap_or_else(|| panic!("no id with prefix {prefix} in output:\n{stdout}"))
        .to_string()
}

#[test]
fn thread_and_item_round_trip() {
    let env = CliTestEnv::new();

    let created = cli(&env, &["threads", "new", "--title", "Standup notes"]);
    let thread_id = extract_id(&created, "th_");

    assert!(
        env.db_path().exists(),
        "database file should exist at {}",
        env.db_path().display()
    );

    cli(&env, &["items", "add", &thread_id, "Shipped the parser"]);
    cli(&env, &["items", "add", &thread_id, "Started on pagination"]);

    let listing = cli(&env, &["threads", "list"]);
    assert!(listing.contains(&thread_id));
    assert!(listing.contains("Standup notes"));

    let items = cli(&env, &["items", "list", &thread_id]);
    let shipped = items.find("Shipped the parser").expect("first item missing");
    let started = items
        .find("Started on pagination")
        .expect("second item missing");
    assert!(
        shipped < started,
        "items should list in append order:\n{items}"
    );

    let shown = cli(&env, &["threads", "show", &thread_id]);
    assert!(shown.contains("Standup notes"));

    cli(&env, &["threads", "rm", &thread_id]);
    let listing = cli(&env, &["threads", "list"]);
    assert!(!listing.contains(&thread_id));
}

#[test]
fn item_listing_paginates_with_cursor() {
    let env = CliTestEnv::new();

    let created = cli(&env, &["threads", "new"]);
    let thread_id = extract_id(&created, "th_");

    let mut item_ids = Vec::new();
    for i in 0..5 {
        let added = cli(&env, &["items", "add", &thread_id, &format!("message {i}")]);
        item_ids.push(extract_id(&added, "it_"));
    }

    let first_page = cli(&env, &["items", "list", &thread_id, "--limit", "2"]);
    assert!(first_page.contains("message 0"));
    assert!(first_page.contains("message 1"));
    assert!(!first_page.contains("message 2"));
    assert!(first_page.contains("more available"));

    let second_page = cli(
        &env,
        &[
            "items",
            "list",
            &thread_id,
            "--limit",
            "2",
            "--after",
            &item_ids[1],
        ],
    );
    assert!(second_page.contains("message 2"));
    assert!(second_page.contains("message 3"));
    assert!(!second_page.contains("message 1"));
}

#[test]
fn attachment_lifecycle_from_the_shell() {
    let env = CliTestEnv::new();
    let source = env.seed_file("logo.png", b"not really a png");

    let stored = cli(&env, &["attachments", "add", source.to_str().unwrap()]);
    assert!(stored.contains("image/png"), "stdout:\n{stored}");
    assert!(stored.contains("Preview: file://"), "stdout:\n{stored}");

    // The summary line ends with the generated id's uuid; recover it from
    // the attachment directory instead of parsing free text.
    let entries: Vec<_> = fs::read_dir(env.attachments_dir())
        .expect("attachment root should exist")
        .collect();
    assert_eq!(entries.len(), 1, "expected one attachment directory");
    let attachment_id = entries[0]
        .as_ref()
        .unwrap()
        .file_name()
        .to_string_lossy()
        .into_owned();

    let info = cli(&env, &["attachments", "info", &attachment_id]);
    assert!(info.contains("\"logo.png\""));
    assert!(info.contains("\"image/png\""));

    let path_output = cli(&env, &["attachments", "path", &attachment_id]);
    let blob_path = PathBuf::from(path_output.trim());
    assert_eq!(fs::read(&blob_path).unwrap(), b"not really a png");

    cli(&env, &["attachments", "rm", &attachment_id]);
    let gone = run_cli(&env, &["attachments", "info", &attachment_id]);
    assert!(
        !gone.status.success(),
        "info should fail after the attachment is deleted"
    );
}

#[test]
fn missing_thread_fails_cleanly() {
    let env = CliTestEnv::new();

    let output = run_cli(&env, &["threads", "show", "th_missing"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("failed to load thread"),
        "stderr should explain the failure:\n{stderr}"
    );
}

#[test]
fn db_override_points_at_custom_path() {
    let env = CliTestEnv::new();
    let custom_db = env.home.join("elsewhere/custom.db");

    cli(
        &env,
        &[
            "--db",
            custom_db.to_str().unwrap(),
            "threads",
            "new",
            "--title",
            "off to the side",
        ],
    );

    assert!(custom_db.exists(), "override database should be created");
    assert!(
        !env.db_path().exists(),
        "default database should stay untouched"
    );
}
