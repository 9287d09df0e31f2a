use crate::batch::{load_batch, BatchFile};
use crate::cli::args::RunArgs;
use crate::command_task::CommandTask;
use crate::exit_codes;
use batchrun_core::report::json::{write_report, RunReport};
use batchrun_core::{ExecuteOptions, Runner, RunnerConfig, TaskStatus};
use std::collections::BTreeSet;

/// Command-line flags win over the batch file.
fn effective_runner_config(batch: &BatchFile, args: &RunArgs) -> RunnerConfig {
    let mut cfg = batch.runner.clone();
    if let Some(secs) = args.timeout {
        cfg.timeout_seconds = Some(secs);
    }
    if let Some(n) = args.max_concurrency {
        cfg.max_concurrency = Some(usize::try_from(n).unwrap_or(usize::MAX));
    }
    if args.quiet {
        cfg.verbose = false;
    }
    cfg
}

fn effective_options(batch: &BatchFile, args: &RunArgs) -> ExecuteOptions<String> {
    let parallel = if args.parallel {
        true
    } else if args.sequential {
        false
    } else {
        batch.parallel
    };
    let filters: BTreeSet<TaskStatus> = if args.retry_on.is_empty() {
        batch.retry_on.iter().copied().collect()
    } else {
        args.retry_on.iter().map(|c| TaskStatus::from(*c)).collect()
    };
    ExecuteOptions {
        common_args: batch.common_args.clone(),
        result_processor: None,
        parallel,
        max_retry_times: args.max_retry_times.unwrap_or(batch.max_retry_times),
        retry_task_filters: filters,
    }
}

/// Commands run in their own process group, so Ctrl-C never reaches them.
fn watch_interrupt(reaper: CommandTask) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let killed = reaper.kill_all();
            eprintln!("Interrupted; killed {} running command(s).", killed);
            std::process::exit(exit_codes::INTERRUPTED);
        }
    });
}

pub(crate) async fn run(args: RunArgs) -> anyhow::Result<i32> {
    let batch = match load_batch(&args.config) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("config error: {:#}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let cfg = effective_runner_config(&batch, &args);
    let options = effective_options(&batch, &args);
    let task = match CommandTask::from_argv(&batch.command) {
        Ok(t) => t.with_timeout(cfg.timeout()),
        Err(e) => {
            eprintln!("config error: {:#}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };
    let reaper = task.clone();
    let tasks = batch.tasks;
    tracing::info!(
        tasks = tasks.len(),
        parallel = options.parallel,
        rounds = options.max_retry_times,
        "running batch"
    );

    watch_interrupt(reaper.clone());

    let description = cfg.description.clone();
    let runner = Runner::new(cfg);
    let started_at = chrono::Utc::now();
    let result = runner
        .execute(move |a| task.run(a), tasks, options)
        .await;
    // Timed-out commands in a concurrent round may outlive their outcome.
    let killed = reaper.kill_all();
    if killed > 0 {
        tracing::debug!(killed, "killed commands still running after the batch");
    }
    let result = match result {
        Ok(r) => r,
        Err(e) => {
            eprintln!("config error: {}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let report = RunReport::from_result(&description, started_at, &result)?;
    write_report(&report, &args.output)?;
    eprintln!(
        "{} succeeded, {} failed ({} total); report: {}",
        report.passed,
        report.failed,
        report.total,
        args.output.display()
    );

    if result.all_succeeded() {
        Ok(exit_codes::SUCCESS)
    } else {
        Ok(exit_codes::TASKS_FAILED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::parse_batch;
    use crate::cli::args::RetryClass;
    use std::path::PathBuf;

    fn args() -> RunArgs {
        RunArgs {
            config: PathBuf::from("batch.yaml"),
            parallel: false,
            sequential: false,
            max_retry_times: None,
            retry_on: vec![],
            timeout: None,
            max_concurrency: None,
            quiet: false,
            output: PathBuf::from("run.json"),
        }
    }

    #[test]
    fn batch_values_apply_without_flags() {
        let batch = parse_batch(
            "command: [\"true\"]\nparallel: true\nmax_retry_times: 2\nretry_on: [error]\ntimeout_seconds: 4\n",
        )
        .unwrap();
        let opts = effective_options(&batch, &args());
        assert!(opts.parallel);
        assert_eq!(opts.max_retry_times, 2);
        assert!(opts.retry_task_filters.contains(&TaskStatus::Error));
        let cfg = effective_runner_config(&batch, &args());
        assert_eq!(cfg.timeout_secs(), Some(4.0));
        assert!(cfg.verbose);
    }

    #[test]
    fn flags_override_batch_values() {
        let batch = parse_batch(
            "command: [\"true\"]\nparallel: true\nretry_on: [error]\ntimeout_seconds: 4\n",
        )
        .unwrap();
        let mut a = args();
        a.sequential = true;
        a.retry_on = vec![RetryClass::Timeout];
        a.timeout = Some(0.0);
        a.quiet = true;
        a.max_concurrency = Some(3);

        let opts = effective_options(&batch, &a);
        assert!(!opts.parallel);
        assert_eq!(
            opts.retry_task_filters.into_iter().collect::<Vec<_>>(),
            vec![TaskStatus::Timeout]
        );
        let cfg = effective_runner_config(&batch, &a);
        assert_eq!(cfg.timeout_secs(), None);
        assert!(!cfg.verbose);
        assert_eq!(cfg.max_concurrency, Some(3));
    }
}
