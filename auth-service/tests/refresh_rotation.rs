mod support;

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use common_auth::Role;
use marketplace_auth::config::InactiveSessionPolicy;
use marketplace_auth::login::PasswordChange;
use marketplace_auth::refresh::SessionGrant;
use marketplace_auth::revocation::{RevocationLedger, RevocationRecord};
use marketplace_auth::sessions::{credential_digest, SessionMetadata, SessionRecord, SessionStore};
use marketplace_auth::SessionError;
use support::{test_config, Harness, TEST_PASSWORD};

async fn login(harness: &Harness, email: &str) -> Result<SessionGrant> {
    Ok(harness
        .state
        .authenticator
        .login(email, TEST_PASSWORD, SessionMetadata::empty())
        .await?)
}

async fn refresh(harness: &Harness, token: &str) -> Result<SessionGrant, SessionError> {
    harness
        .state
        .coordinator
        .refresh(token, SessionMetadata::empty())
        .await
}

#[tokio::test]
async fn issued_credentials_share_subject_and_role() -> Result<()> {
    let harness = Harness::new()?;
    harness.seed_account("u1", "u1@shop.example", Role::Admin).await?;

    let grant = login(&harness, "u1@shop.example").await?;
    let verifier = &harness.state.jwt_verifier;
    let access = verifier.verify_access(&grant.tokens.access_token)?;
    let refresh = verifier.verify_refresh(&grant.tokens.refresh_token)?;

    assert_eq!(access.subject, "u1");
    assert_eq!(refresh.subject, "u1");
    assert_eq!(access.role, Role::Admin);
    assert_eq!(refresh.role, Role::Admin);
    assert!(verifier.verify_access(&grant.tokens.refresh_token).is_err());
    assert!(verifier.verify_refresh(&grant.tokens.access_token).is_err());
    Ok(())
}

#[tokio::test]
async fn rotated_credential_is_never_accepted_again() -> Result<()> {
    let harness = Harness::new()?;
    harness.seed_account("u1", "u1@shop.example", Role::User).await?;

    let first = login(&harness, "u1@shop.example").await?;
    let second = refresh(&harness, &first.tokens.refresh_token).await?;
    assert_eq!(second.account.id, "u1");
    assert_ne!(second.tokens.refresh_token, first.tokens.refresh_token);

    // The old credential still verifies but its session is gone.
    assert!(harness
        .state
        .jwt_verifier
        .verify_refresh(&first.tokens.refresh_token)
        .is_ok());
    let replay = refresh(&harness, &first.tokens.refresh_token).await;
    assert!(matches!(replay, Err(SessionError::UnknownSession)));

    // The rotated credential keeps working.
    refresh(&harness, &second.tokens.refresh_token).await?;
    Ok(())
}

#[tokio::test]
async fn expired_session_is_rejected_and_removed() -> Result<()> {
    let harness = Harness::new()?;
    harness.seed_account("u1", "u1@shop.example", Role::User).await?;
    let grant = login(&harness, "u1@shop.example").await?;

    let digest = credential_digest(&grant.tokens.refresh_token);
    let sessions = &harness.stores.sessions;
    let record = sessions.find_by_digest(&digest).await?.expect("session");
    sessions.delete(record.id).await?;
    sessions
        .create(&SessionRecord {
            issued_at: Utc::now() - Duration::days(8),
            expires_at: Utc::now() - Duration::seconds(1),
            ..record
        })
        .await?;

    let result = refresh(&harness, &grant.tokens.refresh_token).await;
    assert!(matches!(result, Err(SessionError::SessionExpired)));
    assert!(sessions.find_by_digest(&digest).await?.is_none());

    let again = refresh(&harness, &grant.tokens.refresh_token).await;
    assert!(matches!(again, Err(SessionError::UnknownSession)));
    Ok(())
}

#[tokio::test]
async fn ledgered_credential_is_revoked_even_with_live_session() -> Result<()> {
    let harness = Harness::new()?;
    harness.seed_account("u1", "u1@shop.example", Role::User).await?;
    let grant = login(&harness, "u1@shop.example").await?;
    let digest = credential_digest(&grant.tokens.refresh_token);

    harness
        .stores
        .ledger
        .revoke(&RevocationRecord {
            token_hash: digest.clone(),
            user_id: "u1".into(),
            created_at: Utc::now(),
        })
        .await?;

    let result = refresh(&harness, &grant.tokens.refresh_token).await;
    assert!(matches!(result, Err(SessionError::RevokedToken)));
    assert!(harness.stores.sessions.find_by_digest(&digest).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn ledger_is_consulted_before_signature() -> Result<()> {
    let harness = Harness::new()?;
    let garbage = "not-a-jwt";

    let malformed = refresh(&harness, garbage).await;
    assert!(matches!(malformed, Err(SessionError::MalformedToken)));

    harness.state.coordinator.revoke(garbage, "admin").await?;
    let revoked = refresh(&harness, garbage).await;
    assert!(matches!(revoked, Err(SessionError::RevokedToken)));
    Ok(())
}

#[tokio::test]
async fn access_credential_is_not_a_refresh_credential() -> Result<()> {
    let harness = Harness::new()?;
    harness.seed_account("u1", "u1@shop.example", Role::User).await?;
    let grant = login(&harness, "u1@shop.example").await?;

    let result = refresh(&harness, &grant.tokens.access_token).await;
    assert!(matches!(result, Err(SessionError::MalformedToken)));
    Ok(())
}

#[tokio::test]
async fn logout_all_removes_every_session() -> Result<()> {
    let harness = Harness::new()?;
    harness.seed_account("u1", "u1@shop.example", Role::User).await?;
    harness.seed_account("u2", "u2@shop.example", Role::User).await?;

    let laptop = login(&harness, "u1@shop.example").await?;
    let phone = login(&harness, "u1@shop.example").await?;
    let other = login(&harness, "u2@shop.example").await?;

    let removed = harness.state.coordinator.logout_all("u1").await?;
    assert_eq!(removed, 2);

    for token in [&laptop.tokens.refresh_token, &phone.tokens.refresh_token] {
        let result = refresh(&harness, token).await;
        assert!(matches!(result, Err(SessionError::UnknownSession)));
    }
    refresh(&harness, &other.tokens.refresh_token).await?;
    Ok(())
}

#[tokio::test]
async fn logout_ledgers_the_credential_by_default() -> Result<()> {
    let harness = Harness::new()?;
    harness.seed_account("u1", "u1@shop.example", Role::User).await?;
    let grant = login(&harness, "u1@shop.example").await?;

    let outcome = harness
        .state
        .coordinator
        .logout("u1", &grant.tokens.refresh_token)
        .await?;
    assert!(outcome.session_removed);
    assert!(outcome.revoked);

    let result = refresh(&harness, &grant.tokens.refresh_token).await;
    assert!(matches!(result, Err(SessionError::RevokedToken)));
    Ok(())
}

#[tokio::test]
async fn logout_without_ledger_falls_back_to_unknown_session() -> Result<()> {
    let mut config = test_config();
    config.sessions.revoke_on_logout = false;
    let harness = Harness::with_config(config)?;
    harness.seed_account("u1", "u1@shop.example", Role::User).await?;
    let grant = login(&harness, "u1@shop.example").await?;

    let outcome = harness
        .state
        .coordinator
        .logout("u1", &grant.tokens.refresh_token)
        .await?;
    assert!(!outcome.revoked);

    let result = refresh(&harness, &grant.tokens.refresh_token).await;
    assert!(matches!(result, Err(SessionError::UnknownSession)));
    Ok(())
}

#[tokio::test]
async fn logout_cannot_touch_another_subjects_session() -> Result<()> {
    let harness = Harness::new()?;
    harness.seed_account("u1", "u1@shop.example", Role::User).await?;
    harness.seed_account("u2", "u2@shop.example", Role::User).await?;
    let victim = login(&harness, "u1@shop.example").await?;

    let outcome = harness
        .state
        .coordinator
        .logout("u2", &victim.tokens.refresh_token)
        .await?;
    assert!(!outcome.session_removed);
    assert!(!outcome.revoked);

    refresh(&harness, &victim.tokens.refresh_token).await?;
    Ok(())
}

#[tokio::test]
async fn deactivated_account_keeps_session_until_reactivated() -> Result<()> {
    let harness = Harness::new()?;
    harness.seed_account("u1", "u1@shop.example", Role::User).await?;
    let grant = login(&harness, "u1@shop.example").await?;

    harness.state.authenticator.set_active("u1", false).await?;
    let result = refresh(&harness, &grant.tokens.refresh_token).await;
    assert!(matches!(result, Err(SessionError::AccountInactive)));

    let digest = credential_digest(&grant.tokens.refresh_token);
    assert!(harness.stores.sessions.find_by_digest(&digest).await?.is_some());

    harness.state.authenticator.set_active("u1", true).await?;
    refresh(&harness, &grant.tokens.refresh_token).await?;
    Ok(())
}

#[tokio::test]
async fn deactivated_account_drops_session_when_configured() -> Result<()> {
    let mut config = test_config();
    config.sessions.inactive_sessions = InactiveSessionPolicy::Delete;
    let harness = Harness::with_config(config)?;
    harness.seed_account("u1", "u1@shop.example", Role::User).await?;
    let grant = login(&harness, "u1@shop.example").await?;

    harness.state.authenticator.set_active("u1", false).await?;
    let result = refresh(&harness, &grant.tokens.refresh_token).await;
    assert!(matches!(result, Err(SessionError::AccountInactive)));

    harness.state.authenticator.set_active("u1", true).await?;
    let result = refresh(&harness, &grant.tokens.refresh_token).await;
    assert!(matches!(result, Err(SessionError::UnknownSession)));
    Ok(())
}

#[tokio::test]
async fn concurrent_refresh_rotates_exactly_once() -> Result<()> {
    let harness = Harness::new()?;
    harness.seed_account("u1", "u1@shop.example", Role::User).await?;
    let grant = login(&harness, "u1@shop.example").await?;
    let token = grant.tokens.refresh_token;

    let (a, b) = tokio::join!(refresh(&harness, &token), refresh(&harness, &token));
    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1);
    for result in [a, b] {
        if let Err(err) = result {
            assert!(matches!(err, SessionError::UnknownSession));
        }
    }
    Ok(())
}

#[tokio::test]
async fn sessions_are_listed_newest_first_and_revocable_by_owner() -> Result<()> {
    let harness = Harness::new()?;
    harness.seed_account("u1", "u1@shop.example", Role::User).await?;
    harness.seed_account("u2", "u2@shop.example", Role::User).await?;
    let coordinator = Arc::clone(&harness.state.coordinator);

    let older = login(&harness, "u1@shop.example").await?;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let newer = login(&harness, "u1@shop.example").await?;

    let listed = coordinator.list_sessions("u1").await?;
    let ids = listed.iter().map(|s| s.id).collect::<Vec<_>>();
    assert_eq!(ids, vec![newer.tokens.session_id, older.tokens.session_id]);

    let foreign = coordinator.revoke_session("u2", older.tokens.session_id).await;
    assert!(matches!(foreign, Err(SessionError::NotFound(_))));

    coordinator.revoke_session("u1", older.tokens.session_id).await?;
    let result = refresh(&harness, &older.tokens.refresh_token).await;
    assert!(matches!(result, Err(SessionError::UnknownSession)));
    assert_eq!(coordinator.list_sessions("u1").await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn purge_removes_only_expired_sessions() -> Result<()> {
    let harness = Harness::new()?;
    harness.seed_account("u1", "u1@shop.example", Role::User).await?;
    let live = login(&harness, "u1@shop.example").await?;
    let stale = login(&harness, "u1@shop.example").await?;

    let sessions = &harness.stores.sessions;
    let record = sessions
        .find_by_digest(&credential_digest(&stale.tokens.refresh_token))
        .await?
        .expect("session");
    sessions.delete(record.id).await?;
    sessions
        .create(&SessionRecord {
            expires_at: Utc::now() - Duration::minutes(5),
            ..record
        })
        .await?;

    let removed = harness.state.coordinator.purge_expired(Utc::now()).await?;
    assert_eq!(removed, 1);
    refresh(&harness, &live.tokens.refresh_token).await?;
    Ok(())
}

#[tokio::test]
async fn login_failures_are_indistinguishable() -> Result<()> {
    let harness = Harness::new()?;
    harness.seed_account("u1", "u1@shop.example", Role::User).await?;
    let authenticator = &harness.state.authenticator;

    let wrong = authenticator
        .login("u1@shop.example", "wrong-password", SessionMetadata::empty())
        .await;
    let unknown = authenticator
        .login("nobody@shop.example", TEST_PASSWORD, SessionMetadata::empty())
        .await;
    assert!(matches!(wrong, Err(SessionError::InvalidCredentials)));
    assert!(matches!(unknown, Err(SessionError::InvalidCredentials)));

    authenticator.set_active("u1", false).await?;
    let inactive = authenticator
        .login("U1@Shop.Example", TEST_PASSWORD, SessionMetadata::empty())
        .await;
    assert!(matches!(inactive, Err(SessionError::AccountInactive)));
    Ok(())
}

#[tokio::test]
async fn password_change_signs_out_everywhere() -> Result<()> {
    let harness = Harness::new()?;
    harness.seed_account("u1", "u1@shop.example", Role::User).await?;
    let first = login(&harness, "u1@shop.example").await?;
    let second = login(&harness, "u1@shop.example").await?;
    let authenticator = &harness.state.authenticator;

    let rejected = authenticator
        .change_password(
            "u1",
            PasswordChange {
                current_password: "not-my-password".into(),
                new_password: "a-much-better-secret".into(),
                confirm_password: "a-much-better-secret".into(),
            },
        )
        .await;
    assert!(matches!(rejected, Err(SessionError::InvalidCredentials)));

    let removed = authenticator
        .change_password(
            "u1",
            PasswordChange {
                current_password: TEST_PASSWORD.into(),
                new_password: "a-much-better-secret".into(),
                confirm_password: "a-much-better-secret".into(),
            },
        )
        .await?;
    assert_eq!(removed, 2);

    for grant in [&first, &second] {
        let result = refresh(&harness, &grant.tokens.refresh_token).await;
        assert!(matches!(result, Err(SessionError::UnknownSession)));
    }

    let old = authenticator
        .login("u1@shop.example", TEST_PASSWORD, SessionMetadata::empty())
        .await;
    assert!(matches!(old, Err(SessionError::InvalidCredentials)));
    authenticator
        .login("u1@shop.example", "a-much-better-secret", SessionMetadata::empty())
        .await?;
    Ok(())
}

/// Scenario: login u1, refresh once, replay the first credential, then deactivate.
#[tokio::test]
async fn u1_rotation_and_deactivation_scenario() -> Result<()> {
    let harness = Harness::new()?;
    harness.seed_account("u1", "u1@shop.example", Role::User).await?;

    let r1 = login(&harness, "u1@shop.example").await?;
    let r2 = refresh(&harness, &r1.tokens.refresh_token).await?;
    assert!(matches!(
        refresh(&harness, &r1.tokens.refresh_token).await,
        Err(SessionError::UnknownSession)
    ));

    harness.state.authenticator.set_active("u1", false).await?;
    assert!(matches!(
        refresh(&harness, &r2.tokens.refresh_token).await,
        Err(SessionError::AccountInactive)
    ));
    Ok(())
}
