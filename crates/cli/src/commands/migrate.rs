use crate::commands::{load_config, migrated_pool, runtime, CommandFailure, CommandResult};

pub fn run() -> CommandResult {
    let result = load_config().and_then(|config| {
        runtime()?.block_on(async {
            let pool = migrated_pool(&config).await?;
            pool.close().await;
            Ok::<(), CommandFailure>(())
        })
    });

    match result {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}
