use crate::batch::load_batch;
use crate::cli::args::ValidateArgs;
use crate::exit_codes;

pub(crate) fn validate(args: ValidateArgs) -> anyhow::Result<i32> {
    let batch = match load_batch(&args.config) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("config error: {:#}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let retry_on: Vec<String> = batch.retry_on.iter().map(|s| s.to_string()).collect();
    println!(
        "ok: {} tasks, command: {}, rounds: {}, retry_on: [{}], parallel: {}",
        batch.tasks.len(),
        batch.command.join(" "),
        batch.max_retry_times,
        retry_on.join(", "),
        batch.parallel
    );
    Ok(exit_codes::SUCCESS)
}
