use matreq_db::fixtures::RequestSeedInfo;
use matreq_db::{DbPool, SeedDataset, SeedResult};

use crate::commands::{load_config, migrated_pool, runtime, CommandFailure, CommandResult};

pub fn run() -> CommandResult {
    let result = load_config().and_then(|config| {
        runtime()?.block_on(async {
            let pool = migrated_pool(&config).await?;
            let outcome = load_and_verify(&pool).await;
            pool.close().await;
            outcome
        })
    });

    match result {
        Ok(seed) => CommandResult::success(
            "seed",
            success_message(seed.materials_seeded.len(), &seed.requests_seeded),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

async fn load_and_verify(pool: &DbPool) -> Result<SeedResult, CommandFailure> {
    let seed = SeedDataset::load(pool)
        .await
        .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

    let verification = SeedDataset::verify(pool)
        .await
        .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;
    if !verification.all_present {
        let failed_checks = verification
            .checks
            .iter()
            .filter_map(|(check, passed)| (!passed).then_some(*check))
            .collect::<Vec<_>>();
        return Err(("seed_verification", verification_message(&failed_checks), 6));
    }

    Ok(seed)
}

fn success_message(materials: usize, requests: &[RequestSeedInfo]) -> String {
    let lines = requests
        .iter()
        .map(|request| {
            format!("  - {}: {} ({})", request.request_no, request.request_id, request.description)
        })
        .collect::<Vec<_>>();
    format!(
        "demo dataset loaded: {materials} materials and {} requests:\n{}",
        requests.len(),
        lines.join("\n")
    )
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
