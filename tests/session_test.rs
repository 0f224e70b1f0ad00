//! 会话通知模式：模式开关、会话 topic、need_action / task_done

mod common;

use common::{setup, PublishScript, TestEnv};
use ntfy_notify::session::{JsonFileStore, MemoryStore, SessionActions, SessionManager, TaskDone};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(10);

fn session(env: &TestEnv) -> SessionManager<MemoryStore> {
    SessionManager::new(MemoryStore::new(), env.clock.clone())
}

fn steps(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_mode_off_sends_nothing() {
    let env = setup(PublishScript::AlwaysOk);
    let session = session(&env);
    let actions = SessionActions::new(&session, &env.notifier);

    assert!(!actions.should_notify());
    assert!(actions.session_notify("Build", "done", false).is_none());
    assert_eq!(actions.need_action("Migrate", "Run it?", None, TIMEOUT, false, false), None);
    assert_eq!(actions.task_done("Build", "ok", &[], false, TIMEOUT, false), TaskDone::Done);
    assert_eq!(env.relay.publish_count(), 0);
}

#[test]
fn test_force_sends_when_mode_off() {
    let env = setup(PublishScript::AlwaysOk);
    let session = session(&env);
    let actions = SessionActions::new(&session, &env.notifier);

    let report = actions.session_notify("Build", "done", true).unwrap();
    assert!(report.success);
    assert_eq!(env.relay.published()[0].url, "https://ntfy.test/test-topic");
}

#[test]
fn test_session_topic_used_without_touching_config() {
    let env = setup(PublishScript::AlwaysOk);
    let session = session(&env);
    session.enable(Some("session-topic".to_string())).unwrap();
    let actions = SessionActions::new(&session, &env.notifier);

    actions.session_notify("Build", "done", false).unwrap();

    assert_eq!(env.relay.published()[0].url, "https://ntfy.test/session-topic");
    assert_eq!(env.notifier.config().topic, "test-topic");
    assert_eq!(session.state().notification_count, 1);
}

#[test]
fn test_need_action_defaults_and_ordinal_reply() {
    let env = setup(PublishScript::AlwaysOk);
    let session = session(&env);
    session.enable(None).unwrap();
    env.relay.reply_at(Duration::from_secs(2), "2");

    let actions = SessionActions::new(&session, &env.notifier);
    let answer = actions.need_action("Migrate", "Run migrations?", None, TIMEOUT, false, false);

    assert_eq!(answer.as_deref(), Some("Cancel"));
    let published = env.relay.published();
    assert_eq!(published[0].header("Title"), Some("Action Required: Migrate"));
    assert_eq!(published[0].header("Priority"), Some("urgent"));
    assert_eq!(published[0].header("Tags"), Some("bell,warning"));
}

#[test]
fn test_need_action_accepts_free_text() {
    let env = setup(PublishScript::AlwaysOk);
    let session = session(&env);
    session.enable(None).unwrap();
    env.relay.reply_at(Duration::ZERO, "skip the seed step");

    let actions = SessionActions::new(&session, &env.notifier);
    let answer = actions.need_action("Migrate", "Run migrations?", None, TIMEOUT, true, false);

    assert_eq!(answer.as_deref(), Some("skip the seed step"));
    assert!(env.relay.published()[0].body.contains("(You can also type a custom response)"));
}

#[test]
fn test_task_done_without_steps() {
    let env = setup(PublishScript::AlwaysOk);
    let session = session(&env);
    session.enable(None).unwrap();
    let actions = SessionActions::new(&session, &env.notifier);

    let outcome = actions.task_done("Build", "All targets built", &[], false, TIMEOUT, false);

    assert_eq!(outcome, TaskDone::Done);
    let published = env.relay.published();
    assert_eq!(published[0].header("Title"), Some("Complete: Build"));
    assert_eq!(published[0].header("Tags"), Some("white_check_mark,tada"));
    assert_eq!(session.state().task_count, 1);
}

#[test]
fn test_task_done_next_step_reply() {
    let env = setup(PublishScript::AlwaysOk);
    let session = session(&env);
    session.enable(None).unwrap();
    env.relay.reply_at(Duration::ZERO, "1");

    let actions = SessionActions::new(&session, &env.notifier);
    let outcome = actions.task_done("Build", "ok", &steps(&["Run tests", "Deploy"]), false, TIMEOUT, false);

    assert_eq!(outcome, TaskDone::Next("Run tests".to_string()));
    assert!(env.relay.published()[0].body.contains("  3. Done (no more actions)"));
}

#[test]
fn test_task_done_done_option() {
    let env = setup(PublishScript::AlwaysOk);
    let session = session(&env);
    session.enable(None).unwrap();
    env.relay.reply_at(Duration::ZERO, "3");

    let actions = SessionActions::new(&session, &env.notifier);
    let outcome = actions.task_done("Build", "ok", &steps(&["Run tests", "Deploy"]), false, TIMEOUT, false);

    assert_eq!(outcome, TaskDone::Done);
}

#[test]
fn test_task_done_timeout_with_and_without_auto_proceed() {
    let env = setup(PublishScript::AlwaysOk);
    let session = session(&env);
    session.enable(None).unwrap();
    let actions = SessionActions::new(&session, &env.notifier);
    let next = steps(&["Run tests", "Deploy"]);

    assert_eq!(actions.task_done("Build", "ok", &next, true, TIMEOUT, false), TaskDone::Next("Run tests".to_string()));
    assert_eq!(actions.task_done("Lint", "ok", &next, false, TIMEOUT, false), TaskDone::NoResponse);
    assert_eq!(session.state().task_count, 2);
}

#[test]
fn test_file_backed_session_survives_restart() {
    let env = setup(PublishScript::AlwaysOk);
    let path = env.notifier.paths().session.clone();

    SessionManager::new(JsonFileStore::new(&path), env.clock.clone())
        .enable(Some("night-build".to_string()))
        .unwrap();

    let reopened = SessionManager::new(JsonFileStore::new(&path), env.clock.clone());
    assert!(reopened.is_enabled());
    assert_eq!(reopened.effective_topic(&env.notifier.config()), "night-build");

    let summary = reopened.disable().unwrap();
    assert_eq!(summary.task_count, 0);
    assert!(!SessionManager::new(JsonFileStore::new(&path), env.clock.clone()).is_enabled());
}

#[test]
fn test_ask_proceed_sends_even_when_mode_off() {
    let env = setup(PublishScript::AlwaysOk);
    let session = session(&env);
    env.relay.reply_at(Duration::ZERO, "1");
    let actions = SessionActions::new(&session, &env.notifier);

    assert!(actions.ask_proceed("Delete old logs", "50 files", TIMEOUT));

    let published = env.relay.published();
    assert_eq!(published[0].header("Title"), Some("Proceed: Delete old logs?"));
    assert_eq!(published[0].header("Priority"), Some("high"));
    assert_eq!(published[0].header("Tags"), Some("question,arrow_right"));
    assert!(published[0].body.starts_with("Should I proceed with: Delete old logs?\n\n50 files"));
}

#[test]
fn test_ask_proceed_declined_or_unanswered() {
    let env = setup(PublishScript::AlwaysOk);
    let session = session(&env);
    let actions = SessionActions::new(&session, &env.notifier);

    assert!(!actions.ask_proceed("Deploy", "", TIMEOUT));

    env.relay.reply_at(env.clock.elapsed(), "No, skip");
    assert!(!actions.ask_proceed("Deploy again", "", TIMEOUT));
}

#[test]
fn test_blocked_uses_session_topic_and_default_options() {
    let env = setup(PublishScript::AlwaysOk);
    let session = session(&env);
    session.enable(Some("session-topic".to_string())).unwrap();
    env.relay.reply_at(Duration::ZERO, "skip");
    let actions = SessionActions::new(&session, &env.notifier);

    let answer = actions.blocked("Tests failing", "3 failures in auth", None, TIMEOUT);

    assert_eq!(answer.as_deref(), Some("Skip"));
    let published = env.relay.published();
    assert_eq!(published[0].url, "https://ntfy.test/session-topic");
    assert_eq!(published[0].header("Title"), Some("Blocked: Tests failing"));
    assert_eq!(published[0].header("Priority"), Some("urgent"));
    assert!(published[0].body.contains("  3. Abort"));
    assert_eq!(session.state().notification_count, 1);
}

#[test]
fn test_error_occurred_lowercases_reply_and_drops_retry() {
    let env = setup(PublishScript::AlwaysOk);
    let session = session(&env);
    env.relay.reply_at(Duration::ZERO, "1");
    let actions = SessionActions::new(&session, &env.notifier);

    let answer = actions.error_occurred("Build failed", "linker error", false, TIMEOUT);

    assert_eq!(answer.as_deref(), Some("skip"));
    let published = env.relay.published();
    assert_eq!(published[0].header("Title"), Some("Error: Build failed"));
    assert_eq!(published[0].header("Tags"), Some("rotating_light,skull"));
    assert!(!published[0].body.contains("Retry"));
}
