use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use quick_notes::auth::{hash_secret, verify_secret};
use quick_notes::db::UserStore;
use quick_notes::models::UserDocument;

const ADMIN_BIN: &str = env!("CARGO_BIN_EXE_quick_notes_admin");

fn admin(dir: &Path, args: &[&str], stdin: &str) -> Output {
    let config = dir.join("config.toml");
    fs::write(&config, "[server]\nbcrypt_cost = 4\n").unwrap();
    let notes_dir = dir.join("notes");

    let mut child = Command::new(ADMIN_BIN)
        .current_dir(dir)
        .env_remove("QUICKNOTES_CONFIG")
        .arg("--config")
        .arg(&config)
        .arg("--notes-dir")
        .arg(&notes_dir)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    if let Some(mut input) = child.stdin.take() {
        input.write_all(stdin.as_bytes()).ok();
    }
    child.wait_with_output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn seed_user(dir: &Path, login: &str, notes: usize) -> UserStore {
    let store = UserStore::new(dir.join("notes"));
    let mut doc = UserDocument::new(login);
    doc.user.password_hash = Some(hash_secret("old-password", 4).unwrap());
    for i in 0..notes {
        doc.notes.push(quick_notes::models::Note {
            id: format!("n{i}"),
            title: "t".into(),
            content: "c".into(),
            created_at: doc.user.created_at.clone(),
            updated_at: doc.user.created_at.clone(),
            created_ip: None,
            updated_ip: None,
        });
    }
    store.save(&doc).unwrap();
    store
}

#[test]
fn test_list_empty_and_populated() {
    let dir = tempfile::tempdir().unwrap();

    let output = admin(dir.path(), &["list"], "");
    assert!(output.status.success());
    assert!(stdout(&output).contains("No users found."));

    seed_user(dir.path(), "alice", 2);
    let output = admin(dir.path(), &["list"], "");
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Username"));
    let row = text.lines().find(|line| line.starts_with("alice")).unwrap();
    assert!(row.contains(" 2 "));
    assert!(row.ends_with("Yes"));
}

#[test]
fn test_reset_clears_password_and_prints_code() {
    let dir = tempfile::tempdir().unwrap();
    let store = seed_user(dir.path(), "bob", 0);

    let output = admin(dir.path(), &["reset", "Bob"], "");
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Password reset for user: bob"));
    let code = text
        .lines()
        .find_map(|line| line.strip_prefix("New recovery code: "))
        .unwrap()
        .trim();
    assert_eq!(code.len(), 8);

    let doc = store.load("bob").unwrap().unwrap();
    assert!(!doc.user.has_password());
    let hashed = doc.user.recovery_code.unwrap();
    assert_ne!(hashed, code);
    assert!(verify_secret(code, &hashed));
}

#[test]
fn test_unknown_user_fails() {
    let dir = tempfile::tempdir().unwrap();

    for args in [&["reset", "ghost"][..], &["delete", "ghost", "--yes"][..]] {
        let output = admin(dir.path(), args, "");
        assert!(!output.status.success());
        assert!(stdout(&output).contains("Error: User 'ghost' not found."));
    }
}

#[test]
fn test_delete_asks_for_confirmation() {
    let dir = tempfile::tempdir().unwrap();
    let store = seed_user(dir.path(), "carol", 3);

    let output = admin(dir.path(), &["delete", "carol"], "y\n");
    assert!(!output.status.success());
    let text = stdout(&output);
    assert!(text.contains("delete user 'carol' and their 3 notes? (yes/no)"));
    assert!(text.contains("Cancelled."));
    assert!(store.load("carol").unwrap().is_some());

    let output = admin(dir.path(), &["delete", "carol"], "YES\n");
    assert!(output.status.success());
    assert!(stdout(&output).contains("User 'carol' and all their notes have been deleted."));
    assert!(store.load("carol").unwrap().is_none());
}

#[test]
fn test_delete_with_yes_skips_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let store = seed_user(dir.path(), "dave", 0);

    let output = admin(dir.path(), &["delete", "dave", "--yes"], "");
    assert!(output.status.success());
    assert!(!stdout(&output).contains("(yes/no)"));
    assert!(store.load("dave").unwrap().is_none());
}
