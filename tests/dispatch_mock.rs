use lift_dispatch::dispatch::DispatchSettings;
use lift_dispatch::dispatch::service::{ControlSurface, DispatchService};
use lift_dispatch::metrics::SeriesSummary;
use lift_dispatch::policy::PolicySettings;
use lift_dispatch::simulator::mock::{MockFaults, MockScenario, MockSimulatorFactory};
use lift_dispatch::state::{AppState, ControllerStatus, RunOutcome};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn fast_settings() -> DispatchSettings {
    DispatchSettings::new(Duration::ZERO, 3, Duration::from_millis(1))
}

fn service_for(
    factory: MockSimulatorFactory,
    settings: DispatchSettings,
) -> (DispatchService<MockSimulatorFactory>, Arc<RwLock<AppState>>) {
    let state = Arc::new(RwLock::new(AppState::new()));
    let service = DispatchService::new(
        factory,
        PolicySettings::default(),
        settings,
        Arc::clone(&state),
    );
    (service, state)
}

fn wait_for_finish(service: &DispatchService<MockSimulatorFactory>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if !service.running() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

fn status(state: &Arc<RwLock<AppState>>) -> Result<ControllerStatus, Box<dyn std::error::Error>> {
    let guard = state.read().map_err(|_| "state lock poisoned")?;
    Ok(guard.status().clone())
}

fn delivered_count(state: &Arc<RwLock<AppState>>) -> Result<usize, Box<dyn std::error::Error>> {
    let guard = state.read().map_err(|_| "state lock poisoned")?;
    Ok(match guard.metrics().summary.arrival_wait {
        SeriesSummary::Ok { count, .. } => count,
        SeriesSummary::NoData => 0,
    })
}

#[test]
fn run_completes_and_delivers_everyone() -> TestResult {
    let scenario = MockScenario::generated(10, 2, 4, 30, 2);
    let (service, state) = service_for(MockSimulatorFactory::new(scenario), fast_settings());

    assert!(service.start().success);
    assert!(wait_for_finish(&service, Duration::from_secs(20)));

    let status = status(&state)?;
    assert_eq!(status.last_outcome, Some(RunOutcome::Completed));
    assert!(!status.running);
    assert_eq!(status.pending_calls, 0);
    assert_eq!(status.claimed_calls, 0);
    assert_eq!(status.waiting_passengers, 0);
    assert_eq!(status.delivered_passengers, 30);
    assert_eq!(delivered_count(&state)?, 30);
    Ok(())
}

#[test]
fn stop_halts_directive_issuance() -> TestResult {
    let scenario = MockScenario::new(10, 2, 4)
        .with_call(0, 8, 1)
        .with_call(3, 2, 9)
        .with_call(1_000_000, 4, 5);
    let factory = MockSimulatorFactory::new(scenario);
    let journal = factory.journal();
    let settings = DispatchSettings::new(Duration::from_millis(5), 3, Duration::from_millis(5));
    let (service, state) = service_for(factory, settings);

    assert!(service.start().success);
    thread::sleep(Duration::from_millis(100));
    let reply = service.stop();
    let issued_at_stop = journal.lock().map_err(|_| "journal poisoned")?.len();
    thread::sleep(Duration::from_millis(100));
    let issued_later = journal.lock().map_err(|_| "journal poisoned")?.len();

    assert!(reply.success);
    assert!(!reply.controller_running);
    assert!(issued_at_stop > 0);
    assert_eq!(issued_at_stop, issued_later);
    assert_eq!(status(&state)?.last_outcome, Some(RunOutcome::Stopped));
    Ok(())
}

#[test]
fn published_status_tracks_running_without_the_service() -> TestResult {
    let scenario = MockScenario::new(6, 1, 4).with_call(1_000_000, 2, 4);
    let (service, state) = service_for(MockSimulatorFactory::new(scenario), fast_settings());
    let receiver = state
        .read()
        .map_err(|_| "state lock poisoned")?
        .subscribe_status();
    assert!(!receiver.borrow().running);

    assert!(service.start().success);
    assert!(receiver.borrow().running);
    assert_eq!(receiver.borrow().policy.as_deref(), Some("greedy_nearest"));

    assert!(service.stop().success);
    assert!(!receiver.borrow().running);
    assert_eq!(receiver.borrow().last_outcome, Some(RunOutcome::Stopped));
    Ok(())
}

#[test]
fn restart_begins_from_fresh_registry_and_metrics() -> TestResult {
    let scenario = MockScenario::generated(8, 2, 4, 12, 1);
    let (service, state) = service_for(MockSimulatorFactory::new(scenario), fast_settings());

    assert!(service.start().success);
    assert!(wait_for_finish(&service, Duration::from_secs(20)));
    assert_eq!(delivered_count(&state)?, 12);

    assert!(service.start().success);
    assert!(wait_for_finish(&service, Duration::from_secs(20)));

    // A carried-over aggregator would report 24 samples here.
    assert_eq!(delivered_count(&state)?, 12);
    assert_eq!(status(&state)?.last_outcome, Some(RunOutcome::Completed));
    Ok(())
}

#[test]
fn persistent_transport_failure_ends_run_as_failed() -> TestResult {
    let factory = MockSimulatorFactory::new(MockScenario::new(6, 1, 4).with_call(0, 1, 5))
        .with_faults(MockFaults::fail_fetches(u32::MAX));
    let journal = factory.journal();
    let settings = DispatchSettings::new(Duration::ZERO, 2, Duration::from_millis(1));
    let (service, state) = service_for(factory, settings);

    assert!(service.start().success);
    assert!(wait_for_finish(&service, Duration::from_secs(5)));

    let status = status(&state)?;
    assert!(matches!(status.last_outcome, Some(RunOutcome::Failed(_))));
    assert!(journal.lock().map_err(|_| "journal poisoned")?.is_empty());
    Ok(())
}

#[test]
fn transient_failures_are_retried() -> TestResult {
    let factory = MockSimulatorFactory::new(MockScenario::new(6, 1, 4).with_call(0, 1, 5))
        .with_faults(MockFaults::fail_fetches(2));
    let (service, state) = service_for(factory, fast_settings());

    assert!(service.start().success);
    assert!(wait_for_finish(&service, Duration::from_secs(5)));

    assert_eq!(status(&state)?.last_outcome, Some(RunOutcome::Completed));
    assert_eq!(delivered_count(&state)?, 1);
    Ok(())
}

#[test]
fn stop_after_completion_reports_not_running() -> TestResult {
    let scenario = MockScenario::new(4, 1, 4).with_call(0, 0, 3);
    let (service, _state) = service_for(MockSimulatorFactory::new(scenario), fast_settings());

    assert!(service.start().success);
    assert!(wait_for_finish(&service, Duration::from_secs(5)));
    let reply = service.stop();

    assert!(!reply.success);
    assert!(!reply.controller_running);
    Ok(())
}
