mod common;

use std::sync::atomic::Ordering;

use common::{config, user, Harness, GROUP, SUPPORT_CHAT};
use modbot_common::{bot_commands::TicketId, hub::BotModule};
use moderation::{
    engine::{Escalation, EscalationPolicy, WARNING_THRESHOLD},
    error::ModerationError,
    store::{ModerationStore, TicketStatus, TicketType},
    tickets::BodyOutcome,
};

#[tokio::test]
async fn ticket_is_kept_when_triage_cannot_be_posted() {
    let h = Harness::new(config(EscalationPolicy::Recommend));
    let carol = user(30, "carol");
    let tickets = h.module.tickets();
    tickets.select_type(carol.id, TicketType::Suggestion).await;
    h.gateway.fail_sends.store(true, Ordering::SeqCst);

    let outcome = tickets
        .receive_body(&carol, Some("a rules channel"), None)
        .await
        .unwrap();
    let BodyOutcome::Submitted(ticket) = outcome else {
        panic!("expected a submitted ticket");
    };
    let stored = h.store.get_ticket(ticket.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TicketStatus::Pending);
    assert_eq!(stored.body, "a rules channel");
    assert_eq!(tickets.session(carol.id).await, None);
    assert!(h.gateway.messages_to(SUPPORT_CHAT).is_empty());
    assert_eq!(h.store.get_ticket(TicketId(2)).await.unwrap(), None);
}

#[tokio::test]
async fn refused_ban_keeps_the_warnings() {
    let h = Harness::new(config(EscalationPolicy::Recommend));
    let engine = h.module.engine();
    engine
        .issue_warning(GROUP, h.bob.id, "spam".to_string(), h.admin.id)
        .await
        .unwrap();
    h.gateway.fail_bans.store(true, Ordering::SeqCst);

    let result = engine.execute_ban(GROUP, h.bob.id).await;
    assert!(matches!(result, Err(ModerationError::Transport(_))));
    assert_eq!(h.store.count_warnings(GROUP, h.bob.id).await.unwrap(), 1);
}

#[tokio::test]
async fn failed_auto_ban_falls_back_to_a_recommendation() {
    let h = Harness::new(config(EscalationPolicy::AutoBan));
    h.gateway.fail_bans.store(true, Ordering::SeqCst);
    let engine = h.module.engine();

    let mut last = None;
    for _ in 0..WARNING_THRESHOLD {
        last = Some(
            engine
                .issue_warning(GROUP, h.bob.id, "spam".to_string(), h.admin.id)
                .await
                .unwrap(),
        );
    }
    let outcome = last.unwrap();
    assert_eq!(outcome.count, WARNING_THRESHOLD);
    assert_eq!(outcome.escalation, Some(Escalation::Recommended));
    assert_eq!(
        h.store.count_warnings(GROUP, h.bob.id).await.unwrap(),
        WARNING_THRESHOLD
    );
    assert!(h.gateway.bans.lock().unwrap().is_empty());
}

#[tokio::test]
async fn refused_ban_command_is_explained_to_the_admin() {
    let h = Harness::new(config(EscalationPolicy::Recommend));
    h.gateway.fail_bans.store(true, Ordering::SeqCst);
    let message = h.message(GROUP, &h.admin, "/ban @bob spam");
    h.module.handle_message(&message).await.unwrap();

    let texts = h.gateway.texts_to(GROUP);
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("Telegram refused the action"));
    assert!(!texts[0].contains("banned"));
    assert!(h.gateway.bans.lock().unwrap().is_empty());
}
