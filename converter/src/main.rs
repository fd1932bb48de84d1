use anyhow::Context;
use checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore, JobSettings};
use clap::Parser;
use converter::{
    Cli, ConcatJoiner, ConversionJob, ConvertError, Controller, JobLayout, Prompter,
    forward_interrupts, init_logging, read_source, sanitize_job_id, spawn_listener,
};
use dotenvy::dotenv;
use lingproc::{TextStats, format_size};
use std::path::Path;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tts::HttpSynthesizer;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            1
        }
    };
    // The stdin reader cannot be cancelled, so leave without waiting for it.
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let mut prompter = Prompter::new(BufReader::new(tokio::io::stdin()));
    let output_root = std::path::absolute(&cli.output_dir)
        .with_context(|| format!("cannot resolve {}", cli.output_dir.display()))?;
    let store = Arc::new(FileCheckpointStore::new(&output_root));

    if cli.cleanup {
        println!(
            "This removes the saved progress and chunk audio of every job under {}.",
            store.root().display()
        );
        if cli.yes || prompter.confirm("Continue?").await? {
            cleanup(&store)?;
        } else {
            println!("Cleanup cancelled.");
        }
        return Ok(0);
    }

    let interactive = cli.file.is_none();

    let source = match &cli.file {
        Some(path) => path.clone(),
        None => match prompter.source_path().await? {
            Some(path) => path,
            None => {
                println!("Cancelled.");
                return Ok(0);
            }
        },
    };
    let source = std::path::absolute(&source)
        .with_context(|| format!("cannot resolve {}", source.display()))?;
    let text = read_source(&source)?;

    if cli.info {
        print_info(&source, &text, cli.max_chars());
        return Ok(0);
    }

    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "job".into());
    let name = match &cli.name {
        Some(name) => name.clone(),
        None if interactive => prompter.ask_or("Job name", &stem).await?,
        None => stem,
    };
    let mut job_id = sanitize_job_id(&name);

    if cli.clean {
        clean(&store, &job_id)?;
        return Ok(0);
    }

    let mut existing = match store.load(&job_id) {
        Ok(cp) => Some(cp),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e.into()),
    };
    if existing.is_none() && cli.name.is_none() && !cli.fresh {
        if let Some(cp) = store.find_by_source(&source)? {
            let question = format!(
                "Found saved progress for this file under job `{}`. Use it?",
                cp.job_id
            );
            if cli.yes || prompter.confirm(&question).await? {
                job_id = cp.job_id.clone();
                existing = Some(cp);
            }
        }
    }

    if let Some(cp) = &existing {
        println!(
            "Saved progress for job {}: {} of {} chunks done.",
            cp.job_id,
            cp.done_count(),
            cp.total_chunks()
        );
        let resume = !cli.fresh && (cli.yes || prompter.confirm("Resume it?").await?);
        if !resume {
            if cli.fresh
                || prompter
                    .confirm("Delete the previous progress and start over?")
                    .await?
            {
                discard(store.as_ref(), cp)?;
                existing = None;
            } else {
                println!("Nothing to do.");
                return Ok(0);
            }
        }
    }

    let settings = match &existing {
        Some(cp) => cp.settings.clone(),
        None => JobSettings {
            language: cli.language.clone(),
            slow: cli.slow,
            voice: cli.voice.clone(),
            prefix: sanitize_job_id(cli.prefix.as_deref().unwrap_or(&job_id)),
            max_chars: cli.max_chars(),
        },
    };
    let job = ConversionJob::new(&job_id, &source, &text, settings.clone(), &output_root)?;
    drop(text);

    let synth = HttpSynthesizer::new(&cli.tts_url, cli.request_timeout())?
        .with_language(settings.language)
        .with_slow(settings.slow)
        .with_voice(settings.voice)
        .with_api_key(cli.api_key.clone());

    let (tx, rx) = mpsc::channel(16);
    spawn_listener(prompter.into_lines(), tx.clone());
    forward_interrupts(tx);
    println!("Type h and Enter for commands.");

    let mut controller = Controller::new(
        Arc::new(synth),
        store,
        Arc::new(ConcatJoiner),
        cli.retry_policy(),
        rx,
    );
    let outcome = match controller.run(&job).await {
        Ok(outcome) => outcome,
        Err(e @ ConvertError::ResumeMismatch { .. }) => {
            eprintln!("Run again with --fresh to start this job over.");
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };
    println!("{outcome}");
    Ok(outcome.exit_code())
}

fn print_info(source: &Path, text: &str, max_chars: usize) {
    let stats = TextStats::of(text);
    println!("File:             {}", source.display());
    println!("Size:             {}", format_size(stats.bytes as u64));
    println!("Characters:       {}", stats.characters);
    println!("Words:            {}", stats.words);
    println!("Lines:            {}", stats.lines);
    println!(
        "Estimated chunks: {} at {max_chars} characters",
        stats.estimated_chunks(max_chars)
    );
}

fn layout_of(store: &FileCheckpointStore, cp: &Checkpoint) -> JobLayout {
    JobLayout::new(store.job_dir(&cp.job_id), cp.settings.prefix.clone())
}

/// Drop a job's record and chunk audio.
fn discard(store: &FileCheckpointStore, cp: &Checkpoint) -> anyhow::Result<()> {
    layout_of(store, cp)
        .remove_chunks(cp.total_chunks())
        .with_context(|| format!("cannot remove audio of job {}", cp.job_id))?;
    store.delete(&cp.job_id)?;
    Ok(())
}

fn clean(store: &FileCheckpointStore, job_id: &str) -> anyhow::Result<()> {
    match store.load(job_id) {
        Ok(cp) => {
            discard(store, &cp)?;
            println!("Removed saved progress for job {job_id}.");
        }
        Err(e) if e.is_not_found() => println!("No saved progress for job {job_id}."),
        Err(e) => {
            // Unreadable record: the chunk names are unknown, drop the record only.
            eprintln!("Warning: {e}");
            store.delete(job_id)?;
            println!("Removed the unreadable record for job {job_id}.");
        }
    }
    Ok(())
}

fn cleanup(store: &FileCheckpointStore) -> anyhow::Result<()> {
    let jobs = store.job_ids()?;
    if jobs.is_empty() {
        println!("No saved progress found.");
    }
    for job_id in &jobs {
        clean(store, job_id)?;
    }
    Ok(())
}
