use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use std::hint::black_box;
use treequest::models::UserProfile;
use treequest::services::leaderboard::{rank, LEADERBOARD_SIZE};
use treequest::services::LeaderboardSort;

/// Deterministic population with plenty of ties.
fn population(n: usize) -> Vec<UserProfile> {
    (0..n)
        .map(|i| {
            let mut profile = UserProfile::new(
                format!("user-{}", i),
                Some(format!("Planter {}", i % 997)),
                None,
            );
            profile.trees = ((i * 7919) % 500) as i64;
            profile.coins = profile.trees * 100 + (i % 250) as i64;
            profile.streak = (i % 30) as i64;
            profile
        })
        .collect()
}

fn benchmark_rank(c: &mut Criterion) {
    let profiles = population(10_000);

    let mut group = c.benchmark_group("leaderboard_rank");

    for (label, sort) in [
        ("by_trees", LeaderboardSort::Trees),
        ("by_coins", LeaderboardSort::Coins),
        ("by_streak", LeaderboardSort::Streak),
    ] {
        group.bench_function(label, |b| {
            b.iter_batched(
                || profiles.clone(),
                |p| rank(black_box(p), sort, LEADERBOARD_SIZE),
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_rank);
criterion_main!(benches);
