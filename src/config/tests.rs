//! Configuration Module Tests
//!
//! ## Test Scopes
//! - **Cli**: defaults, overrides and bounds of the command line.
//! - **Identity**: the service id file is created once and reused.

#[cfg(test)]
mod tests {
    use crate::config::{Cli, Command, SERVICE_ID_FILE, load_or_create_service_id};

    use clap::Parser;
    use std::time::Duration;

    // ============================================================
    // CLI TESTS
    // ============================================================

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::try_parse_from(["order-cluster", "serve"]).unwrap();

        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.listen_addr(), "127.0.0.1:8080");
        assert_eq!(args.advertised_addr(), "127.0.0.1:8080");
        assert!(args.join.is_none());
        assert!(args.store_url.is_none());

        let pipelines = args.pipeline_settings();
        assert_eq!(pipelines.pipelines, 50);
        assert_eq!(pipelines.stall_retry, Duration::from_secs(30));

        let cluster = args.cluster_settings();
        assert_eq!(cluster.heartbeat, Duration::from_millis(500));
        assert_eq!(cluster.offline_after(), Duration::from_millis(2500));
        assert_eq!(cluster.liveness_interval, Duration::from_secs(10));

        assert_eq!(args.step_delay(), Duration::from_secs(5));
        assert!((args.failure_ratio() - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn test_serve_overrides() {
        let cli = Cli::try_parse_from([
            "order-cluster",
            "serve",
            "--port",
            "9001",
            "--advertise",
            "10.0.0.2:9001",
            "--join",
            "10.0.0.1:9000",
            "--pipelines",
            "4",
            "--failure-percent",
            "0",
        ])
        .unwrap();

        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.advertised_addr(), "10.0.0.2:9001");
        assert_eq!(args.join.as_deref(), Some("10.0.0.1:9000"));
        assert_eq!(args.pipeline_settings().pipelines, 4);
        assert_eq!(args.failure_ratio(), 0.0);
    }

    #[test]
    fn test_failure_percent_is_bounded() {
        let result = Cli::try_parse_from(["order-cluster", "serve", "--failure-percent", "101"]);

        assert!(result.is_err());
    }

    #[test]
    fn test_store_subcommand() {
        let cli = Cli::try_parse_from(["order-cluster", "store", "--port", "7000"]).unwrap();

        assert_eq!(cli.command.log_level(), "info");
        let Command::Store(args) = cli.command else {
            panic!("expected store");
        };
        assert_eq!(args.listen_addr(), "127.0.0.1:7000");
    }

    // ============================================================
    // IDENTITY TESTS
    // ============================================================

    #[test]
    fn test_service_id_is_created_once() {
        // ARRANGE
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("nested");

        // ACT
        let first = load_or_create_service_id(&data_dir).unwrap();
        let second = load_or_create_service_id(&data_dir).unwrap();

        // ASSERT
        assert_eq!(first, second);
        assert!(uuid::Uuid::parse_str(&first).is_ok());
        assert_eq!(
            std::fs::read_to_string(data_dir.join(SERVICE_ID_FILE)).unwrap(),
            first
        );
    }

    #[test]
    fn test_existing_service_id_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SERVICE_ID_FILE), "svc-a\n").unwrap();

        let service_id = load_or_create_service_id(dir.path()).unwrap();

        assert_eq!(service_id, "svc-a");
    }
}
