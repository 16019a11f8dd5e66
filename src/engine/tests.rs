#[cfg(test)]
mod tests {
    use crate::clock::{Clock, ManualClock};
    use crate::configuration::Config;
    use crate::engine::{AuthOutcome, Engine, Janitor, Status};
    use crate::error_handling::types::{EngineError, SessionError};
    use crate::monitoring::MetricsSnapshot;
    use crate::network::{Protocol, TrafficDelta};
    use crate::session_management::{IdSource, OsRngIds, SessionManager};
    use chrono::Duration;
    use std::net::{IpAddr, SocketAddr};
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc, Arc, Mutex};
    use std::thread;
    use uuid::Uuid;

    fn engine() -> (Arc<ManualClock>, Engine) {
        let clock = Arc::new(ManualClock::default());
        let engine = Engine::with_clock(Config::default(), clock.clone());
        (clock, engine)
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn granted(outcome: AuthOutcome) -> crate::session_management::Session {
        match outcome {
            AuthOutcome::Granted(session) => session,
            AuthOutcome::Blocked => panic!("authentication unexpectedly blocked"),
        }
    }

    /// Panics on the first draw while armed, then behaves like the OS RNG source.
    struct PanickingIds {
        armed: AtomicBool,
    }

    impl IdSource for PanickingIds {
        fn next_id(&self) -> Result<Uuid, SessionError> {
            if self.armed.swap(false, Ordering::SeqCst) {
                panic!("id source exploded");
            }
            OsRngIds.next_id()
        }
    }

    /// Parks the first caller of `now()` while armed until the test releases it.
    struct GateClock {
        inner: ManualClock,
        armed: AtomicBool,
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl Clock for GateClock {
        fn now(&self) -> chrono::DateTime<chrono::Utc> {
            if self.armed.swap(false, Ordering::SeqCst) {
                let _ = self.entered.lock().unwrap().send(());
                let _ = self.release.lock().unwrap().recv();
            }
            self.inner.now()
        }
    }

    #[test]
    fn test_brute_force_blocks_login_and_session_creation() {
        let (clock, engine) = engine();
        let attacker = ip("198.51.100.7");

        for _ in 0..4 {
            assert_eq!(engine.on_login_attempt(attacker, false), Status::Ok);
        }
        assert_eq!(engine.on_login_attempt(attacker, false), Status::Blocked);

        // correct credentials during the block are refused too
        assert_eq!(engine.on_login_attempt(attacker, true), Status::Blocked);
        let outcome = engine
            .on_auth_success("u1", "steve", attacker, "ua")
            .unwrap();
        assert_eq!(outcome, AuthOutcome::Blocked);
        assert!(engine.sessions().is_empty());

        clock.advance(Duration::minutes(15));
        let session = granted(
            engine
                .on_auth_success("u1", "steve", attacker, "ua")
                .unwrap(),
        );
        assert_eq!(engine.validate_session(&session.id.to_string()), Status::Ok);
    }

    #[test]
    fn test_refused_attempts_do_not_extend_block() {
        let (clock, engine) = engine();
        let attacker = ip("198.51.100.7");

        for _ in 0..5 {
            engine.on_login_attempt(attacker, false);
        }
        for _ in 0..14 {
            clock.advance(Duration::minutes(1));
            assert_eq!(engine.on_login_attempt(attacker, false), Status::Blocked);
        }
        clock.advance(Duration::minutes(1));

        assert_eq!(engine.on_login_attempt(attacker, true), Status::Ok);
    }

    #[test]
    fn test_session_lifecycle_through_tokens() {
        let (clock, engine) = engine();
        let session = granted(
            engine
                .on_auth_success("u1", "steve", ip("203.0.113.45"), "Mozilla/5.0")
                .unwrap(),
        );
        let token = session.id.to_string();

        assert_eq!(engine.validate_session(&token), Status::Ok);
        assert_eq!(engine.validate_session("not-a-session"), Status::NotFound);

        clock.advance(Duration::minutes(31));
        assert_eq!(engine.validate_session(&token), Status::Expired);
        assert_eq!(engine.validate_session(&token), Status::NotFound);
        assert_eq!(engine.terminate_session(&token), Status::NotFound);
    }

    #[test]
    fn test_user_sessions_are_terminated_together() {
        let (_, engine) = engine();
        let a = granted(engine.on_auth_success("u1", "steve", ip("203.0.113.1"), "ua").unwrap());
        let b = granted(engine.on_auth_success("u1", "steve", ip("203.0.113.2"), "ua").unwrap());

        assert_eq!(engine.sessions().list_active_for_user("u1").len(), 2);
        assert_eq!(engine.terminate_user_sessions("u1"), 2);
        assert_eq!(engine.validate_session(&a.id.to_string()), Status::NotFound);
        assert_eq!(engine.validate_session(&b.id.to_string()), Status::NotFound);
    }

    #[test]
    fn test_banned_address_cannot_connect_or_log_in() {
        let (_, engine) = engine();
        let bad = ip("198.51.100.23");
        let conn = SocketAddr::new(bad, 19132);

        assert_eq!(engine.on_connection_open(conn, Protocol::UDP, None), Status::Ok);
        assert_eq!(engine.ban_ip(bad), 1);

        assert_eq!(engine.on_connection_open(conn, Protocol::UDP, None), Status::Blocked);
        assert_eq!(engine.on_login_attempt(bad, true), Status::Blocked);
        assert_eq!(
            engine.on_auth_success("u1", "steve", bad, "ua").unwrap(),
            AuthOutcome::Blocked
        );

        assert!(engine.unban_ip(bad));
        assert_eq!(engine.on_connection_open(conn, Protocol::UDP, None), Status::Ok);
    }

    #[test]
    fn test_ban_racing_connection_open_leaves_no_live_connection() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let clock = Arc::new(GateClock {
            inner: ManualClock::default(),
            armed: AtomicBool::new(false),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        let engine = Arc::new(Engine::with_clock(Config::default(), clock.clone()));
        let bad = ip("198.51.100.23");

        // the opener passes the ban check, then parks on the clock before inserting
        clock.armed.store(true, Ordering::SeqCst);
        let opener = {
            let engine = engine.clone();
            thread::spawn(move || {
                engine.on_connection_open(SocketAddr::new(bad, 4000), Protocol::TCP, None)
            })
        };
        entered_rx.recv().unwrap();

        assert_eq!(engine.ban_ip(bad), 0);
        release_tx.send(()).unwrap();
        let status = opener.join().unwrap();

        assert_eq!(status, Status::Blocked);
        assert!(engine.reputation().is_banned(bad));
        assert!(engine
            .connections()
            .connections()
            .iter()
            .all(|c| c.ip() != bad));
    }

    #[test]
    fn test_suspicion_escalation_and_pardon() {
        let (_, engine) = engine();
        let bad = ip("198.51.100.23");
        engine.on_connection_open(SocketAddr::new(bad, 4000), Protocol::TCP, None);

        engine.mark_suspicious(bad);
        engine.mark_suspicious(bad);
        let third = engine.mark_suspicious(bad);
        assert!(third.newly_banned);
        assert_eq!(third.evicted, 1);
        assert!(engine.connections().connections().is_empty());

        let fourth = engine.mark_suspicious(bad);
        assert!(!fourth.newly_banned);
        assert!(engine.reputation().is_banned(bad));

        assert!(engine.unban_ip(bad));
        assert_eq!(engine.reputation().suspicion_count(bad), 4);
        assert!(engine.mark_suspicious(bad).newly_banned);
    }

    #[test]
    fn test_connection_events() {
        let (clock, engine) = engine();
        let a = addr("203.0.113.5:19132");
        let delta = TrafficDelta {
            bytes_in: 512,
            bytes_out: 128,
            packets_in: 4,
            packets_out: 2,
        };

        assert_eq!(engine.on_connection_activity(a, delta), Status::NotFound);
        engine.on_connection_open(a, Protocol::UDP, Some("alex".into()));
        assert_eq!(engine.on_connection_activity(a, delta), Status::Ok);

        clock.advance(Duration::minutes(4));
        assert_eq!(engine.on_connection_activity(a, delta), Status::Ok);
        clock.advance(Duration::minutes(4));
        assert_eq!(engine.sweep().connections, Some(0));

        assert_eq!(engine.kick_player("steve"), Status::NotFound);
        assert_eq!(engine.kick_player("alex"), Status::Ok);
        assert_eq!(engine.on_connection_close(a), Status::NotFound);
        assert_eq!(engine.connections().stats().totals.bytes_in, 1024);
    }

    #[test]
    fn test_sweep_covers_every_ttl_table() {
        let (clock, engine) = engine();
        engine
            .on_auth_success("u1", "steve", ip("203.0.113.1"), "ua")
            .unwrap();
        for _ in 0..5 {
            engine.on_login_attempt(ip("198.51.100.7"), false);
        }
        engine.on_connection_open(addr("203.0.113.9:1000"), Protocol::TCP, None);

        clock.advance(Duration::minutes(45));
        let report = engine.sweep();

        assert_eq!(report.sessions, Some(1));
        // one success, five failures and one block
        assert_eq!(report.login, Some(7));
        assert_eq!(report.connections, Some(1));
        assert_eq!(report.total(), 9);
    }

    #[test]
    fn test_poisoned_table_is_skipped_once() {
        let clock: Arc<ManualClock> = Arc::new(ManualClock::default());
        let sessions = SessionManager::with_id_source(
            Config::default().sessions,
            clock.clone(),
            Box::new(PanickingIds {
                armed: AtomicBool::new(true),
            }),
        );
        let engine = Engine::with_session_manager(Config::default(), clock.clone(), sessions);

        let crashed = catch_unwind(AssertUnwindSafe(|| {
            engine.on_auth_success("u1", "steve", ip("203.0.113.1"), "ua")
        }));
        assert!(crashed.is_err());

        let report = engine.sweep();
        assert_eq!(report.sessions, None);
        assert_eq!(report.login, Some(0));

        // requests keep working and the next sweep proceeds normally
        let session = granted(
            engine
                .on_auth_success("u1", "steve", ip("203.0.113.1"), "ua")
                .unwrap(),
        );
        assert_eq!(engine.validate_session(&session.id.to_string()), Status::Ok);
        assert_eq!(engine.sweep().sessions, Some(0));
    }

    #[test]
    fn test_sample_metrics_reports_deltas() {
        let (_, engine) = engine();
        let a = addr("203.0.113.5:19132");
        engine.on_connection_open(a, Protocol::UDP, Some("alex".into()));
        engine.on_connection_open(addr("203.0.113.6:19132"), Protocol::UDP, None);
        engine.on_connection_activity(
            a,
            TrafficDelta {
                bytes_in: 300,
                bytes_out: 100,
                ..Default::default()
            },
        );

        let first = engine.sample_metrics();
        assert_eq!(first.network_in, 300);
        assert_eq!(first.network_out, 100);
        assert_eq!(first.players, 1);

        engine.on_connection_activity(
            a,
            TrafficDelta {
                bytes_in: 20,
                ..Default::default()
            },
        );
        let second = engine.sample_metrics();
        assert_eq!(second.network_in, 20);
        assert_eq!(second.network_out, 0);

        let point = engine.on_metrics_tick(second);
        assert_eq!(engine.metrics().latest(), Some(point));
    }

    #[test]
    fn test_metrics_history_bound_through_engine() {
        let (clock, engine) = engine();

        for i in 0..1500 {
            engine.on_metrics_tick(MetricsSnapshot {
                players: i,
                ..Default::default()
            });
            clock.advance(Duration::seconds(1));
        }

        assert_eq!(engine.metrics().len(), 1440);
        assert_eq!(engine.metrics().points()[0].players, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_janitor_sweeps_and_samples() {
        let clock = Arc::new(ManualClock::default());
        let engine = Arc::new(Engine::with_clock(Config::default(), clock.clone()));
        let idle = addr("203.0.113.5:1000");
        let busy = addr("203.0.113.6:1000");
        engine.on_connection_open(idle, Protocol::TCP, None);
        engine.on_connection_open(busy, Protocol::TCP, None);

        let janitor = Janitor::spawn(
            engine.clone(),
            std::time::Duration::from_secs(60),
            std::time::Duration::from_secs(1),
        )
        .unwrap();

        clock.advance(Duration::minutes(6));
        engine.on_connection_activity(busy, TrafficDelta::default());
        tokio::time::sleep(std::time::Duration::from_secs(61)).await;

        assert!(engine.connections().connection(idle).is_none());
        assert!(engine.connections().connection(busy).is_some());
        assert!(engine.metrics().len() >= 60);
        assert_eq!(engine.metrics().latest().unwrap().timestamp, clock.now());

        tokio_test::assert_ok!(janitor.shutdown().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_janitor_stops_on_shutdown() {
        let engine = Arc::new(Engine::with_clock(
            Config::default(),
            Arc::new(ManualClock::default()),
        ));
        let janitor = Janitor::spawn(
            engine.clone(),
            std::time::Duration::from_secs(60),
            std::time::Duration::from_secs(1),
        )
        .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(2500)).await;
        tokio_test::assert_ok!(janitor.shutdown().await);
        let samples = engine.metrics().len();
        tokio::time::sleep(std::time::Duration::from_secs(10)).await;

        assert_eq!(samples, 2);
        assert_eq!(engine.metrics().len(), samples);
    }

    #[tokio::test]
    async fn test_janitor_rejects_zero_periods() {
        let engine = Arc::new(Engine::with_clock(
            Config::default(),
            Arc::new(ManualClock::default()),
        ));
        let second = std::time::Duration::from_secs(1);

        assert_eq!(
            Janitor::spawn(engine.clone(), std::time::Duration::ZERO, second).err(),
            Some(EngineError::ZeroPeriod("sweep"))
        );
        assert_eq!(
            Janitor::spawn(engine, second, std::time::Duration::ZERO).err(),
            Some(EngineError::ZeroPeriod("metrics"))
        );
    }

    #[test]
    fn test_clock_is_shared_with_components() {
        let (clock, engine) = engine();
        clock.advance(Duration::hours(1));

        assert_eq!(engine.clock().now(), clock.now());
    }
}
