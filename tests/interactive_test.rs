//! 交互式提问：发送按钮、轮询回复、超时

mod common;

use common::{setup, PublishScript};
use ntfy_notify::notification::{AskState, CancelToken, Question, Responder};
use std::time::Duration;

fn options(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_ordinal_reply_returns_option() {
    let env = setup(PublishScript::AlwaysOk);
    env.relay.reply_at(Duration::from_secs(2), "1");

    let responder = Responder::new(&env.notifier);
    let answer = responder.ask("Deploy?", "Proceed?", &["Yes", "No"], Duration::from_secs(5));

    assert_eq!(answer.as_deref(), Some("Yes"));
    assert_eq!(env.clock.elapsed(), Duration::from_secs(2));
    assert_eq!(responder.state(), AskState::Responded("Yes".to_string()));
}

#[test]
fn test_question_carries_buttons_and_numbered_list() {
    let env = setup(PublishScript::AlwaysOk);
    env.relay.reply_at(Duration::ZERO, "no");

    let answer = Responder::new(&env.notifier).ask("Deploy?", "Proceed?", &["Yes", "No"], Duration::from_secs(5));
    assert_eq!(answer.as_deref(), Some("No"));

    let published = env.relay.published();
    assert_eq!(published.len(), 1);
    let question = &published[0];
    assert_eq!(question.url, "https://ntfy.test/test-topic");
    assert_eq!(question.header("Priority"), Some("high"));
    assert_eq!(question.body, "Proceed?\n\nReply with:\n  1. Yes\n  2. No");
    assert_eq!(
        question.header("Actions"),
        Some("http, Yes, https://ntfy.test/test-topic, body=YES; http, No, https://ntfy.test/test-topic, body=NO")
    );

    let polls = env.relay.polls();
    assert_eq!(polls.len(), 1);
    assert!(polls[0].starts_with("https://ntfy.test/test-topic/json?poll=1&since="));
}

#[test]
fn test_at_most_three_buttons() {
    let env = setup(PublishScript::AlwaysOk);
    env.relay.reply_at(Duration::ZERO, "4");

    let answer = Responder::new(&env.notifier).ask(
        "Pick",
        "Which one?",
        &["A", "B", "C", "D"],
        Duration::from_secs(5),
    );
    assert_eq!(answer.as_deref(), Some("D"));

    let published = env.relay.published();
    let actions = published[0].header("Actions").unwrap();
    assert_eq!(actions.matches("http, ").count(), 3);
    assert!(published[0].body.contains("  4. D"));
}

#[test]
fn test_no_matching_reply_times_out() {
    let env = setup(PublishScript::AlwaysOk);
    env.relay.reply_at(Duration::from_secs(1), "maybe");

    let responder = Responder::new(&env.notifier);
    let answer = responder.ask("Deploy?", "Proceed?", &["Yes", "No"], Duration::from_secs(5));

    assert_eq!(answer, None);
    assert_eq!(responder.state(), AskState::TimedOut);
    assert_eq!(env.clock.elapsed(), Duration::from_secs(5));
    assert_eq!(
        env.clock.sleeps(),
        vec![Duration::from_secs(2), Duration::from_secs(2), Duration::from_secs(1)]
    );
    assert_eq!(env.relay.polls().len(), 3);
}

#[test]
fn test_failed_send_does_not_wait() {
    let env = setup(PublishScript::AlwaysStatus(503));

    let responder = Responder::new(&env.notifier);
    let answer = responder.ask("Deploy?", "Proceed?", &["Yes", "No"], Duration::from_secs(60));

    assert_eq!(answer, None);
    assert!(matches!(responder.state(), AskState::Failed(msg) if msg.contains("HTTP 503")));
    assert!(env.relay.polls().is_empty());
    assert!(env.clock.sleeps().is_empty());
}

#[test]
fn test_cancelled_before_reply() {
    let env = setup(PublishScript::AlwaysOk);
    let token = CancelToken::new();
    token.cancel();

    let responder = Responder::new(&env.notifier).with_cancel_token(token);
    let question = Question::new("Deploy?", "Proceed?", options(&["Yes", "No"]));

    assert_eq!(responder.ask_with(&question), AskState::Cancelled);
    assert_eq!(env.relay.publish_count(), 1);
}

#[test]
fn test_confirm_requires_explicit_confirm() {
    let env = setup(PublishScript::AlwaysOk);
    env.relay.reply_at(Duration::ZERO, "confirm");
    assert!(Responder::new(&env.notifier).ask_confirm("Drop table", "users", Duration::from_secs(5)));

    let env = setup(PublishScript::AlwaysOk);
    env.relay.reply_at(Duration::ZERO, "cancel");
    assert!(!Responder::new(&env.notifier).ask_confirm("Drop table", "users", Duration::from_secs(5)));
}

#[test]
fn test_user_input_returns_free_text() {
    let env = setup(PublishScript::AlwaysOk);
    env.relay.reply_at(Duration::from_secs(4), "  use the staging db  ");

    let state = Responder::new(&env.notifier).get_user_input(
        "Which database?",
        "Migration is ready",
        Duration::from_secs(30),
        None,
    );

    assert_eq!(state, AskState::Responded("use the staging db".to_string()));
    let published = env.relay.published();
    assert_eq!(published[0].header("Title"), Some("Input Needed: Which database?"));
    assert_eq!(published[0].header("Click"), Some("https://ntfy.test/test-topic"));
}

#[test]
fn test_question_is_logged_to_history() {
    let env = setup(PublishScript::AlwaysOk);
    env.relay.reply_at(Duration::ZERO, "yes");

    Responder::new(&env.notifier).ask_yes_no("Ship it?", "All green", Duration::from_secs(5));

    let entries = env.notifier.history().entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].title, "Ship it?");
    assert!(entries[0].success);
}
