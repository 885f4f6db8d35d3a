mod common;

use chrono::Utc;
use common::{config, user, Harness, GROUP, OWNER};
use modbot_common::{
    gateway::{IncomingMessage, MemberRank},
    hub::BotModule,
    teloxide::types::ChatId,
};
use moderation::{
    engine::{EscalationPolicy, DEFAULT_RESTRICTION_MINUTES},
    store::{BroadcastMessage, ModerationStore},
};

async fn send(h: &Harness, message: IncomingMessage) {
    h.module.handle_message(&message).await.unwrap();
}

#[tokio::test]
async fn three_warnings_reach_the_limit() {
    let h = Harness::new(config(EscalationPolicy::Recommend));
    for reason in ["spam", "flood", "insults"] {
        send(&h, h.message(GROUP, &h.admin, &format!("/warn @bob {reason}"))).await;
    }

    let texts = h.gateway.texts_to(GROUP);
    assert_eq!(texts.len(), 3);
    assert!(texts[0].contains("1/3"));
    assert!(texts[1].contains("2/3"));
    assert!(texts[2].contains("3/3"));
    assert!(texts[2].contains("Consider banning"));
    assert!(!texts[1].contains("Consider banning"));

    let reasons: Vec<_> = h
        .store
        .get_warnings(GROUP, h.bob.id)
        .await
        .unwrap()
        .into_iter()
        .map(|warning| warning.reason)
        .collect();
    assert_eq!(reasons, vec!["spam", "flood", "insults"]);
    assert!(h.gateway.bans.lock().unwrap().is_empty());
}

#[tokio::test]
async fn auto_ban_mode_bans_on_the_third_warning() {
    let h = Harness::new(config(EscalationPolicy::AutoBan));
    for _ in 0..3 {
        send(&h, h.message(GROUP, &h.admin, "/warn@ModBot @bob spam")).await;
    }
    assert_eq!(*h.gateway.bans.lock().unwrap(), vec![(GROUP, h.bob.id)]);
    assert_eq!(h.store.count_warnings(GROUP, h.bob.id).await.unwrap(), 0);
    let texts = h.gateway.texts_to(GROUP);
    assert!(texts.last().unwrap().starts_with("💬 System banned @bob"));
}

#[tokio::test]
async fn non_admin_attempts_are_deleted_silently() {
    let h = Harness::new(config(EscalationPolicy::Recommend));
    let message = h.message(GROUP, &h.bob, "/ban @admin");
    let message_id = message.message_id;
    send(&h, message).await;

    assert_eq!(*h.gateway.deleted.lock().unwrap(), vec![(GROUP, message_id)]);
    assert!(h.gateway.texts_to(GROUP).is_empty());
    assert!(h.gateway.bans.lock().unwrap().is_empty());
}

#[tokio::test]
async fn rejections_are_explained_to_the_admin() {
    let h = Harness::new(config(EscalationPolicy::Recommend));
    let other_admin = user(11, "other_admin");
    h.gateway
        .add_member(GROUP, &other_admin, MemberRank::Administrator);

    send(&h, h.message(GROUP, &h.admin, "/mute @other_admin")).await;
    send(&h, h.message(GROUP, &h.admin, "/warn")).await;
    send(&h, h.message(GROUP, &h.admin, "/unwarn @bob")).await;

    let texts = h.gateway.texts_to(GROUP);
    assert_eq!(texts.len(), 3);
    assert!(texts[0].contains("Administrators can't be targeted"));
    assert!(texts[1].contains("User not found"));
    assert!(texts[2].contains("no warnings"));
    assert!(h.gateway.restrictions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn ban_by_reply_clears_warnings_and_carries_the_broadcast() {
    let h = Harness::new(config(EscalationPolicy::Recommend));
    h.store
        .set_broadcast_message(BroadcastMessage {
            text: "Read the rules!".to_string(),
            owner_id: OWNER,
        })
        .await
        .unwrap();
    send(&h, h.message(GROUP, &h.admin, "/warn @bob spam")).await;

    let mut ban = h.message(GROUP, &h.admin, "/ban scam links");
    ban.reply_to = Some(h.bob.clone());
    send(&h, ban).await;

    assert_eq!(*h.gateway.bans.lock().unwrap(), vec![(GROUP, h.bob.id)]);
    assert_eq!(h.store.count_warnings(GROUP, h.bob.id).await.unwrap(), 0);
    let notice = h.gateway.sent.lock().unwrap().last().unwrap().1.clone();
    assert!(notice.silent);
    assert_eq!(
        notice.text,
        "💬 @admin banned @bob\nReason: scam links\n\nRead the rules\\!"
    );
}

#[tokio::test]
async fn mute_uses_the_default_duration_and_unmute_lifts_it() {
    let h = Harness::new(config(EscalationPolicy::Recommend));
    let before = Utc::now();
    send(&h, h.message(GROUP, &h.admin, "/mute @bob flooding")).await;
    send(&h, h.message(GROUP, &h.admin, "/mute @bob 2h")).await;

    let restrictions = h.gateway.restrictions.lock().unwrap().clone();
    assert_eq!(restrictions.len(), 2);
    let default_until = restrictions[0].2;
    let minutes = (default_until - before).num_minutes();
    assert!((DEFAULT_RESTRICTION_MINUTES as i64 - 1..=DEFAULT_RESTRICTION_MINUTES as i64)
        .contains(&minutes));
    let two_hours = (restrictions[1].2 - before).num_minutes();
    assert!((119..=120).contains(&two_hours));

    let texts = h.gateway.texts_to(GROUP);
    assert!(texts[0].contains("for 30m"));
    assert!(texts[0].contains("Reason: flooding"));
    assert!(texts[1].contains("for 2h"));
    assert!(!texts[1].contains("Reason"));

    send(&h, h.message(GROUP, &h.admin, "/unmute @bob")).await;
    assert_eq!(*h.gateway.lifted.lock().unwrap(), vec![(GROUP, h.bob.id)]);
}

#[tokio::test]
async fn warns_lists_the_ledger() {
    let h = Harness::new(config(EscalationPolicy::Recommend));
    send(&h, h.message(GROUP, &h.admin, "/warn @bob spam")).await;
    send(&h, h.message(GROUP, &h.admin, "/warn @bob flood")).await;
    send(&h, h.message(GROUP, &h.admin, "/unwarn @bob")).await;
    send(&h, h.message(GROUP, &h.admin, "/warns @bob")).await;

    let texts = h.gateway.texts_to(GROUP);
    assert!(texts[2].contains("Remaining: 1/3"));
    let listing = texts.last().unwrap();
    assert!(listing.contains("Total: 1/3"));
    assert!(listing.contains("spam"));
    assert!(!listing.contains("flood"));
}

#[tokio::test]
async fn commands_outside_the_allowed_chat_are_refused() {
    let mut config = config(EscalationPolicy::Recommend);
    config.allowed_chat_id = Some(ChatId(-100_777));
    let h = Harness::new(config);
    send(&h, h.message(GROUP, &h.admin, "/warn @bob spam")).await;

    assert_eq!(h.store.count_warnings(GROUP, h.bob.id).await.unwrap(), 0);
    let texts = h.gateway.texts_to(GROUP);
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("doesn't moderate this chat"));
}

#[tokio::test]
async fn only_the_owner_manages_the_broadcast() {
    let h = Harness::new(config(EscalationPolicy::Recommend));
    send(&h, h.message(GROUP, &h.admin, "/add Be nice")).await;
    assert_eq!(h.store.get_broadcast_message().await.unwrap(), None);

    let owner = user(OWNER.0, "owner");
    send(&h, h.private_message(&owner, Some("/add Be nice"), None)).await;
    assert_eq!(
        h.store.get_broadcast_message().await.unwrap(),
        Some(BroadcastMessage {
            text: "Be nice".to_string(),
            owner_id: OWNER,
        })
    );

    send(&h, h.private_message(&owner, Some("/clear_msg"), None)).await;
    assert_eq!(h.store.get_broadcast_message().await.unwrap(), None);
}
