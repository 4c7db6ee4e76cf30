use super::*;
use crate::foundation::config::SceneLimits;
use crate::foundation::core::Fps;
use crate::scene::SceneValidator;

fn job(requester: u64) -> RenderJob {
    let desc = SceneValidator::new(SceneLimits::default())
        .validate(br#"{"version":"1","viewport":{"width":4,"height":4},"duration_secs":1}"#)
        .unwrap();
    let params = RenderParams::new(2, 2, Fps::new(5, 1).unwrap());
    RenderJob::queued(JobId(1), RequesterId(requester), desc, params)
}

#[test]
fn terminal_states() {
    assert!(!JobState::Queued.is_terminal());
    assert!(!JobState::Running.is_terminal());
    assert!(JobState::Succeeded.is_terminal());
    assert!(JobState::Failed.is_terminal());
    assert!(JobState::Cancelled.is_terminal());
    assert!(JobEvent::Cancelled.is_terminal());
    assert!(!JobEvent::Started { attempt: 1 }.is_terminal());
}

#[test]
fn queued_job_reports_frame_total() {
    let j = job(1);
    let s = j.status();
    assert_eq!(s.state, JobState::Queued);
    assert_eq!(s.frames_total, 5);
    assert_eq!(s.waiters, 1);
    assert_eq!(s.attempt, 0);
    assert!(!s.cache_hit);
}

#[test]
fn subscribers_get_current_state_then_events() {
    let j = job(1);
    let rx = j.subscribe();
    j.set_progress(2, 5);
    j.finish(&mut j.lock(), Outcome::Cancelled);

    let events: Vec<_> = rx.iter().collect();
    assert_eq!(
        events,
        vec![
            JobEvent::Queued,
            JobEvent::Progress {
                frames_done: 2,
                frames_total: 5
            },
            JobEvent::Cancelled,
        ]
    );
}

#[test]
fn late_subscriber_gets_terminal_event_only() {
    let j = job(1);
    j.finish(
        &mut j.lock(),
        Outcome::Failed(RenderError::engine("bad shape")),
    );
    let events: Vec<_> = j.subscribe().iter().collect();
    assert_eq!(events.len(), 1);
    match &events[0] {
        JobEvent::Failed { kind, message } => {
            assert_eq!(kind, "engine_fault");
            assert!(message.contains("bad shape"));
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn dropped_receivers_are_pruned() {
    let j = job(1);
    drop(j.subscribe());
    let _keep = j.subscribe();
    j.set_progress(1, 5);
    assert_eq!(j.lock().subscribers.len(), 1);
}

#[test]
fn finish_is_one_shot() {
    let j = job(1);
    j.finish(&mut j.lock(), Outcome::Cancelled);
    j.finish(
        &mut j.lock(),
        Outcome::Failed(RenderError::engine("late")),
    );
    assert_eq!(j.status().state, JobState::Cancelled);
    assert!(j.status().error.is_none());
}

#[test]
fn wait_times_out_without_touching_the_job() {
    let j = job(1);
    let err = j.wait(RequesterId(1), Duration::from_millis(20)).unwrap_err();
    assert!(matches!(err, FramecastError::Timeout { .. }));
    assert_eq!(j.status().waiters, 1);
    assert_eq!(j.status().state, JobState::Queued);
}

#[test]
fn withdrawn_requester_wait_is_cancelled() {
    let j = Arc::new(job(1));
    j.lock().requesters.insert(RequesterId(2));

    let waiter = {
        let j = Arc::clone(&j);
        std::thread::spawn(move || j.wait(RequesterId(1), Duration::from_secs(10)))
    };
    std::thread::sleep(Duration::from_millis(20));
    j.lock().requesters.remove(&RequesterId(1));
    j.notify();

    let err = waiter.join().unwrap().unwrap_err();
    assert!(matches!(err, FramecastError::Cancelled));
    assert_eq!(j.status().state, JobState::Queued);
}

#[test]
fn failure_is_broadcast_to_every_waiter() {
    let j = Arc::new(job(1));
    j.lock().requesters.insert(RequesterId(2));
    let waiters: Vec<_> = [1, 2]
        .into_iter()
        .map(|r| {
            let j = Arc::clone(&j);
            std::thread::spawn(move || j.wait(RequesterId(r), Duration::from_secs(10)))
        })
        .collect();
    std::thread::sleep(Duration::from_millis(20));
    j.finish(
        &mut j.lock(),
        Outcome::Failed(RenderError::encoder("bad codec")),
    );
    for w in waiters {
        match w.join().unwrap() {
            Err(FramecastError::RenderFailed(e)) => assert_eq!(e, RenderError::encoder("bad codec")),
            other => panic!("unexpected result {other:?}"),
        }
    }
}
