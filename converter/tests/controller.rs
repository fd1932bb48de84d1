use checkpoint::{
    Checkpoint, CheckpointError, CheckpointStore, ChunkStatus, FileCheckpointStore, JobState,
};
use converter::{
    Command, ConcatJoiner, ConvertError, Controller, Outcome, RetryPolicy, write_durable,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tts::SynthesisError;

use fakes::{
    FakeSynth, Step, audio_for, controller, fast_retry, harness, job_for, sentence, wait_until,
};

fn expected_audio(parts: usize) -> Vec<u8> {
    (0..parts).flat_map(|i| audio_for(&sentence(i))).collect()
}

#[tokio::test]
async fn completes_joins_and_cleans_up() {
    let h = harness(3);
    let (synth, _started) = FakeSynth::new(vec![]);
    let (mut c, _tx) = controller(synth.clone(), &h, fast_retry(3));

    let outcome = c.run(&h.job).await.unwrap();

    let output = h.job.layout.final_path();
    assert_eq!(outcome, Outcome::Completed { output: output.clone(), total: 3 });
    assert_eq!(fs::read(&output).unwrap(), expected_audio(3));
    assert_eq!(synth.calls(), vec![sentence(0), sentence(1), sentence(2)]);
    assert!(h.store.load("story").unwrap_err().is_not_found());
    for i in 0..3 {
        assert!(!h.job.layout.chunk_path(i).exists());
    }
}

#[tokio::test]
async fn resume_skips_completed_chunks() {
    let h = harness(5);
    let mut cp = h.job.new_checkpoint();
    h.job.layout.ensure().unwrap();
    for i in 0..3 {
        let path = h.job.layout.chunk_path(i);
        write_durable(&path, &audio_for(&sentence(i))).unwrap();
        cp.apply_done(i, &path).unwrap();
    }
    h.store.save(&cp).unwrap();

    let (synth, _started) = FakeSynth::new(vec![]);
    let (mut c, _tx) = controller(synth.clone(), &h, fast_retry(3));
    let outcome = c.run(&h.job).await.unwrap();

    assert!(matches!(outcome, Outcome::Completed { total: 5, .. }));
    assert_eq!(synth.calls(), vec![sentence(3), sentence(4)]);
    assert_eq!(fs::read(h.job.layout.final_path()).unwrap(), expected_audio(5));
}

#[tokio::test]
async fn pause_lets_the_current_chunk_finish() {
    let h = harness(4);
    let gate = Arc::new(Notify::new());
    let (synth, mut started) = FakeSynth::new(vec![Step::Audio, Step::Gate(gate.clone())]);
    let (mut c, tx) = controller(synth.clone(), &h, fast_retry(3));
    let job = h.job.clone();
    let run = tokio::spawn(async move { c.run(&job).await });

    started.recv().await.unwrap();
    started.recv().await.unwrap();
    tx.send(Command::Pause).await.unwrap();
    gate.notify_one();

    let store = h.store.clone();
    wait_until(|| matches!(store.load("story"), Ok(cp) if cp.state == JobState::Paused)).await;
    let cp = h.store.load("story").unwrap();
    assert_eq!(cp.done_indices(), vec![0, 1]);
    assert_eq!(synth.calls().len(), 2);

    tx.send(Command::Resume).await.unwrap();
    let outcome = run.await.unwrap().unwrap();
    assert!(matches!(outcome, Outcome::Completed { total: 4, .. }));
    assert_eq!(synth.calls().len(), 4);
}

#[tokio::test]
async fn stop_waits_for_the_current_chunk() {
    let h = harness(3);
    let gate = Arc::new(Notify::new());
    let (synth, mut started) = FakeSynth::new(vec![Step::Gate(gate.clone())]);
    let (mut c, tx) = controller(synth.clone(), &h, fast_retry(3));
    let job = h.job.clone();
    let run = tokio::spawn(async move { c.run(&job).await });

    started.recv().await.unwrap();
    tx.send(Command::StopSave).await.unwrap();
    gate.notify_one();

    let outcome = run.await.unwrap().unwrap();
    assert_eq!(
        outcome,
        Outcome::Stopped { done: 1, total: 3, forced: false }
    );
    assert_eq!(synth.calls().len(), 1);
    let cp = h.store.load("story").unwrap();
    assert_eq!(cp.state, JobState::Stopped);
    assert!(cp.is_done(0));
    assert!(h.job.layout.chunk_path(0).exists());
}

#[tokio::test]
async fn force_stop_abandons_the_chunk_in_flight() {
    let h = harness(3);
    let (synth, mut started) = FakeSynth::new(vec![Step::Audio, Step::Hang]);
    let (mut c, tx) = controller(synth, &h, fast_retry(3));
    let job = h.job.clone();
    let run = tokio::spawn(async move { c.run(&job).await });

    started.recv().await.unwrap();
    started.recv().await.unwrap();
    tx.send(Command::ForceStop).await.unwrap();

    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome, Outcome::Stopped { done: 1, total: 3, forced: true });
    let cp = h.store.load("story").unwrap();
    assert_eq!(cp.state, JobState::Stopped);
    assert_eq!(cp.status(1), ChunkStatus::Pending);
    assert!(!h.job.layout.chunk_path(1).exists());
}

#[tokio::test]
async fn stop_delete_erases_everything() {
    let h = harness(3);
    let (synth, mut started) = FakeSynth::new(vec![Step::Audio, Step::Hang]);
    let (mut c, tx) = controller(synth, &h, fast_retry(3));
    let job = h.job.clone();
    let run = tokio::spawn(async move { c.run(&job).await });

    started.recv().await.unwrap();
    started.recv().await.unwrap();
    tx.send(Command::StopSave).await.unwrap();
    tx.send(Command::StopDelete).await.unwrap();

    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome, Outcome::Deleted);
    assert!(h.store.load("story").unwrap_err().is_not_found());
    assert!(!h.job.layout.dir().exists());
}

#[tokio::test]
async fn closed_input_while_paused_stops_and_saves() {
    let h = harness(3);
    let (synth, _started) = FakeSynth::new(vec![]);
    let (mut c, tx) = controller(synth.clone(), &h, fast_retry(3));
    tx.send(Command::Pause).await.unwrap();
    drop(tx);

    let outcome = c.run(&h.job).await.unwrap();
    assert_eq!(outcome, Outcome::Stopped { done: 0, total: 3, forced: false });
    assert!(synth.calls().is_empty());
    assert_eq!(h.store.load("story").unwrap().state, JobState::Stopped);
}

#[tokio::test]
async fn input_ending_while_paused_stops_and_saves() {
    let h = harness(3);
    let (synth, _started) = FakeSynth::new(vec![]);
    let (mut c, tx) = controller(synth.clone(), &h, fast_retry(3));
    tx.send(Command::Pause).await.unwrap();
    let job = h.job.clone();
    let run = tokio::spawn(async move { c.run(&job).await });

    let store = h.store.clone();
    wait_until(|| matches!(store.load("story"), Ok(cp) if cp.state == JobState::Paused)).await;
    // The sender stays alive, as the interrupt handler keeps one.
    tx.send(Command::InputClosed).await.unwrap();

    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome, Outcome::Stopped { done: 0, total: 3, forced: false });
    assert!(synth.calls().is_empty());
    assert_eq!(h.store.load("story").unwrap().state, JobState::Stopped);
}

#[tokio::test]
async fn stop_delete_while_paused_erases_everything() {
    let h = harness(3);
    let (synth, _started) = FakeSynth::new(vec![]);
    let (mut c, tx) = controller(synth.clone(), &h, fast_retry(3));
    tx.send(Command::Pause).await.unwrap();
    let job = h.job.clone();
    let run = tokio::spawn(async move { c.run(&job).await });

    let store = h.store.clone();
    wait_until(|| matches!(store.load("story"), Ok(cp) if cp.state == JobState::Paused)).await;
    tx.send(Command::StopDelete).await.unwrap();

    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome, Outcome::Deleted);
    assert!(synth.calls().is_empty());
    assert!(h.store.load("story").unwrap_err().is_not_found());
    assert!(!h.job.layout.dir().exists());
}

#[tokio::test]
async fn force_stop_while_paused_keeps_progress() {
    let h = harness(3);
    let gate = Arc::new(Notify::new());
    let (synth, mut started) = FakeSynth::new(vec![Step::Gate(gate.clone())]);
    let (mut c, tx) = controller(synth.clone(), &h, fast_retry(3));
    let job = h.job.clone();
    let run = tokio::spawn(async move { c.run(&job).await });

    started.recv().await.unwrap();
    tx.send(Command::Pause).await.unwrap();
    gate.notify_one();
    let store = h.store.clone();
    wait_until(|| matches!(store.load("story"), Ok(cp) if cp.state == JobState::Paused)).await;
    tx.send(Command::ForceStop).await.unwrap();

    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome, Outcome::Stopped { done: 1, total: 3, forced: true });
    assert_eq!(synth.calls().len(), 1);
    let cp = h.store.load("story").unwrap();
    assert_eq!(cp.state, JobState::Stopped);
    assert!(cp.is_done(0));
}

#[tokio::test]
async fn force_stop_cuts_a_retry_delay_short() {
    let h = harness(2);
    let (synth, mut started) = FakeSynth::new(vec![Step::Fail(SynthesisError::Transient(
        "connection reset".into(),
    ))]);
    let slow_retry = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_secs(60),
        max_delay: Duration::from_secs(60),
    };
    let (mut c, tx) = controller(synth.clone(), &h, slow_retry);
    let job = h.job.clone();
    let run = tokio::spawn(async move { c.run(&job).await });

    started.recv().await.unwrap();
    // Let the failed attempt settle into its retry delay.
    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(Command::ForceStop).await.unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("force stop did not interrupt the retry delay")
        .unwrap()
        .unwrap();
    assert_eq!(outcome, Outcome::Stopped { done: 0, total: 2, forced: true });
    assert_eq!(synth.calls().len(), 1);
    let cp = h.store.load("story").unwrap();
    assert_eq!(cp.status(0), ChunkStatus::Pending);
    assert!(!h.job.layout.chunk_path(0).exists());
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let h = harness(2);
    let (synth, _started) = FakeSynth::new(vec![
        Step::Fail(SynthesisError::Transient("connection reset".into())),
        Step::Fail(SynthesisError::RateLimited {
            retry_after: Some(Duration::from_millis(10)),
        }),
    ]);
    let (mut c, _tx) = controller(synth.clone(), &h, fast_retry(3));

    let outcome = c.run(&h.job).await.unwrap();
    assert!(matches!(outcome, Outcome::Completed { total: 2, .. }));
    assert_eq!(
        synth.calls(),
        vec![sentence(0), sentence(0), sentence(0), sentence(1)]
    );
}

#[tokio::test]
async fn permanent_failures_are_not_retried() {
    let h = harness(2);
    let (synth, _started) = FakeSynth::new(vec![Step::Fail(SynthesisError::Permanent(
        "unsupported characters".into(),
    ))]);
    let (mut c, _tx) = controller(synth.clone(), &h, fast_retry(3));

    let outcome = c.run(&h.job).await.unwrap();
    assert_eq!(
        outcome,
        Outcome::Failed { errored: vec![0], done: 1, total: 2 }
    );
    assert_eq!(synth.calls(), vec![sentence(0), sentence(1)]);
    let cp = h.store.load("story").unwrap();
    assert_eq!(cp.status(0), ChunkStatus::Errored);
    assert!(cp.chunks[&0].error.as_deref().unwrap().contains("unsupported"));
}

#[tokio::test]
async fn exhausted_chunks_fail_the_job_and_are_retried_next_run() {
    let h = harness(3);
    let transient = || Step::Fail(SynthesisError::Transient("503".into()));
    let (synth, _started) = FakeSynth::new(vec![Step::Audio, transient(), transient()]);
    let (mut c, _tx) = controller(synth.clone(), &h, fast_retry(2));

    let outcome = c.run(&h.job).await.unwrap();
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(
        outcome,
        Outcome::Failed { errored: vec![1], done: 2, total: 3 }
    );
    let cp = h.store.load("story").unwrap();
    assert_eq!(cp.state, JobState::Failed);
    assert_eq!(cp.chunks[&1].failures, 1);
    assert!(cp.chunks[&1].error.as_deref().unwrap().contains("gave up after 2 attempts"));

    let (synth, _started) = FakeSynth::new(vec![]);
    let (mut c, _tx) = controller(synth.clone(), &h, fast_retry(2));
    let outcome = c.run(&h.job).await.unwrap();
    assert!(matches!(outcome, Outcome::Completed { total: 3, .. }));
    assert_eq!(synth.calls(), vec![sentence(1)]);
    assert_eq!(fs::read(h.job.layout.final_path()).unwrap(), expected_audio(3));
}

#[tokio::test]
async fn changed_source_is_rejected_on_resume() {
    let h = harness(3);
    h.store.save(&h.job.new_checkpoint()).unwrap();
    let edited = job_for(h.dir.path(), "Part 00 of the story. A new ending.");

    let (synth, _started) = FakeSynth::new(vec![]);
    let (mut c, _tx) = controller(synth.clone(), &h, fast_retry(3));
    let err = c.run(&edited).await.unwrap_err();

    assert!(matches!(err, ConvertError::ResumeMismatch { .. }));
    assert!(synth.calls().is_empty());
}

#[tokio::test]
async fn restart_after_crash_finishes_only_the_rest() {
    let h = harness(10);
    let (synth, mut started) = FakeSynth::new(
        (0..7).map(|_| Step::Audio).chain([Step::Hang]).collect(),
    );
    let (mut c, _tx) = controller(synth, &h, fast_retry(3));
    let job = h.job.clone();
    let run = tokio::spawn(async move { c.run(&job).await });

    // The eighth request starts only after the seventh chunk is recorded.
    for _ in 0..8 {
        started.recv().await.unwrap();
    }
    run.abort();
    let _ = run.await;

    let cp = h.store.load("story").unwrap();
    assert_eq!(cp.done_indices(), (0..7).collect::<Vec<_>>());

    let (synth, _started) = FakeSynth::new(vec![]);
    let (mut c, _tx) = controller(synth.clone(), &h, fast_retry(3));
    let outcome = c.run(&h.job).await.unwrap();

    assert!(matches!(outcome, Outcome::Completed { total: 10, .. }));
    assert_eq!(synth.calls(), vec![sentence(7), sentence(8), sentence(9)]);
    assert_eq!(fs::read(h.job.layout.final_path()).unwrap(), expected_audio(10));
}

/// Store whose `mark_done` breaks after the first chunk.
struct BrokenStore(FileCheckpointStore);

impl CheckpointStore for BrokenStore {
    fn load(&self, job_id: &str) -> checkpoint::Result<Checkpoint> {
        self.0.load(job_id)
    }

    fn save(&self, checkpoint: &Checkpoint) -> checkpoint::Result<()> {
        self.0.save(checkpoint)
    }

    fn delete(&self, job_id: &str) -> checkpoint::Result<()> {
        self.0.delete(job_id)
    }

    fn mark_done(&self, job_id: &str, index: usize, output: &Path) -> checkpoint::Result<()> {
        if index == 0 {
            return self.0.mark_done(job_id, index, output);
        }
        Err(CheckpointError::Io {
            path: self.0.record_path(job_id),
            source: std::io::Error::other("disk full"),
        })
    }
}

#[tokio::test]
async fn checkpoint_failure_is_fatal_and_names_the_last_chunk() {
    let h = harness(3);
    let store = Arc::new(BrokenStore(FileCheckpointStore::new(h.dir.path())));
    let (synth, _started) = FakeSynth::new(vec![]);
    let (_tx, rx) = mpsc::channel(1);
    let mut c = Controller::new(synth, store, Arc::new(ConcatJoiner), fast_retry(3), rx);

    let err = c.run(&h.job).await.unwrap_err();
    match err {
        ConvertError::Checkpoint { job_id, last_done, .. } => {
            assert_eq!(job_id, "story");
            assert_eq!(last_done, Some(0));
        }
        other => panic!("unexpected error: {other}"),
    }
}
