// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running
//! (FIRESTORE_EMULATOR_HOST set). Each test uses its own user ID so runs
//! against a shared emulator do not interfere.

use chrono::{Duration, Utc};
use treequest::backend::memory::default_achievements;
use treequest::backend::{BackendClient, Rule};
use treequest::error::AppError;
use treequest::models::{
    NewPlanting, PlantingStatus, Record, Species, StatsDelta, UserProfile,
};

mod common;
use common::{test_firestore, unique_user_id};

fn test_profile(user_id: &str) -> UserProfile {
    UserProfile::new(user_id, Some("Test User".to_string()), Some("test@example.com".to_string()))
}

fn test_planting(user_id: &str, key: &str) -> NewPlanting {
    NewPlanting {
        user_id: user_id.to_string(),
        species: Species::Oak,
        location: "Central Park".to_string(),
        description: None,
        coordinates: None,
        tree_photo: Some("https://example.com/tree.jpg".to_string()),
        selfie: Some("https://example.com/selfie.jpg".to_string()),
        idempotency_key: key.to_string(),
        created_at: Utc::now(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PROFILE TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_profile_created_once() {
    require_emulator!();

    let db = test_firestore().await;
    let user_id = unique_user_id("profile");

    // Initially, profile should not exist
    assert!(db.get_profile(&user_id).await.unwrap().is_none());

    let first = db
        .create_record(Record::Profile(test_profile(&user_id)), Some(&user_id))
        .await
        .unwrap();
    assert!(first.created);

    // Second creation does not overwrite counters
    db.atomic_increment(&user_id, StatsDelta::planting(100), "p-1")
        .await
        .unwrap();
    let second = db
        .create_record(Record::Profile(test_profile(&user_id)), Some(&user_id))
        .await
        .unwrap();
    assert!(!second.created);

    let profile = db.get_profile(&user_id).await.unwrap().unwrap();
    assert_eq!(profile.trees, 1);
    assert_eq!(profile.coins, 100);
}

#[tokio::test]
async fn test_touch_profile_updates_last_active() {
    require_emulator!();

    let db = test_firestore().await;
    let user_id = unique_user_id("touch");
    db.create_record(Record::Profile(test_profile(&user_id)), Some(&user_id))
        .await
        .unwrap();

    let later = Utc::now() + Duration::hours(1);
    db.touch_profile(&user_id, later).await.unwrap();

    let profile = db.get_profile(&user_id).await.unwrap().unwrap();
    assert_eq!(profile.last_active.timestamp(), later.timestamp());

    let recent = db
        .list_profiles(Some(later - Duration::minutes(1)))
        .await
        .unwrap();
    assert!(recent.iter().any(|p| p.id == user_id));
}

// ═══════════════════════════════════════════════════════════════════════════
// INCREMENT TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_increment_idempotent_per_award_key() {
    require_emulator!();

    let db = test_firestore().await;
    let user_id = unique_user_id("credit");
    db.create_record(Record::Profile(test_profile(&user_id)), Some(&user_id))
        .await
        .unwrap();

    let first = db
        .atomic_increment(&user_id, StatsDelta::planting(100), "planting-a")
        .await
        .unwrap();
    assert!(first.applied);

    let again = db
        .atomic_increment(&user_id, StatsDelta::planting(100), "planting-a")
        .await
        .unwrap();
    assert!(!again.applied, "Same award key must not be credited twice");

    db.atomic_increment(&user_id, StatsDelta::planting(100), "planting-b")
        .await
        .unwrap();

    let profile = db.get_profile(&user_id).await.unwrap().unwrap();
    assert_eq!(profile.trees, 2);
    assert_eq!(profile.coins, 200);
}

#[tokio::test]
async fn test_increment_unknown_user() {
    require_emulator!();

    let db = test_firestore().await;
    let err = db
        .atomic_increment(&unique_user_id("ghost"), StatsDelta::planting(100), "p")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

// ═══════════════════════════════════════════════════════════════════════════
// PLANTING TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_planting_created_once_per_key() {
    require_emulator!();

    let db = test_firestore().await;
    let user_id = unique_user_id("planter");
    let key = uuid::Uuid::new_v4().to_string();

    let first = db
        .create_record(Record::Planting(test_planting(&user_id, &key)), Some(&key))
        .await
        .unwrap();
    let retry = db
        .create_record(Record::Planting(test_planting(&user_id, &key)), Some(&key))
        .await
        .unwrap();

    assert!(first.created);
    assert!(!retry.created);
    assert_eq!(first.id, retry.id);

    let trees = db.list_plantings(&user_id).await.unwrap();
    assert_eq!(trees.len(), 1);
    assert_eq!(trees[0].status, PlantingStatus::Pending);
}

#[tokio::test]
async fn test_invalid_planting_never_written() {
    require_emulator!();

    let db = test_firestore().await;
    let user_id = unique_user_id("sloppy");
    let mut planting = test_planting(&user_id, "bad-key");
    planting.location = "   ".to_string();

    let err = db
        .create_record(Record::Planting(planting), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(db.list_plantings(&user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_verify_planting_once() {
    require_emulator!();

    let db = test_firestore().await;
    let user_id = unique_user_id("verify");
    let key = uuid::Uuid::new_v4().to_string();
    let created = db
        .create_record(Record::Planting(test_planting(&user_id, &key)), Some(&key))
        .await
        .unwrap();

    let verified = db
        .mark_planting_verified(&created.id, Utc::now())
        .await
        .unwrap()
        .expect("First verification should flip the record");
    assert_eq!(verified.status, PlantingStatus::Verified);
    assert!(verified.verified_at.is_some());

    let again = db.mark_planting_verified(&created.id, Utc::now()).await.unwrap();
    assert!(again.is_none());
}

// ═══════════════════════════════════════════════════════════════════════════
// REWARD & ACHIEVEMENT TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_redeem_unknown_reward() {
    require_emulator!();

    let db = test_firestore().await;
    let user_id = unique_user_id("redeemer");
    db.create_record(Record::Profile(test_profile(&user_id)), Some(&user_id))
        .await
        .unwrap();

    let err = db
        .redeem(&user_id, "no-such-reward", 1)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let profile = db.get_profile(&user_id).await.unwrap().unwrap();
    assert_eq!(profile.coins, 0);
}

#[tokio::test]
async fn test_racing_achievement_checks_report_each_award_once() {
    require_emulator!();

    let db = std::sync::Arc::new(test_firestore().await);
    db.seed_catalog(&[], &default_achievements()).await.unwrap();

    let user_id = unique_user_id("achiever");
    let mut profile = test_profile(&user_id);
    profile.trees = 10;
    db.create_record(Record::Profile(profile), Some(&user_id))
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        db.run_rule(Rule::CheckAchievements, &user_id),
        db.run_rule(Rule::CheckAchievements, &user_id)
    );
    let mut reported: Vec<String> = a
        .unwrap()
        .into_iter()
        .chain(b.unwrap())
        .map(|achievement| achievement.id)
        .collect();
    reported.sort();
    assert_eq!(reported, vec!["first-tree", "grove"]);

    // Grove bonus credited once
    let profile = db.get_profile(&user_id).await.unwrap().unwrap();
    assert_eq!(profile.coins, 100);
    assert_eq!(db.list_user_achievements(&user_id).await.unwrap().len(), 2);
}
