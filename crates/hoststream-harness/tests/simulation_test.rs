//! End-to-end client runs over Turmoil's simulated network.
//!
//! The mock host listens on the real service ports of a simulated machine
//! named `as400`; the client connects through [`SimTransport`] with seeded
//! randomness, so every run replays the same schedule.

use std::time::Duration;

use bytes::Bytes;
use hoststream_client::{ClientConfig, ClientError, HostSystem, Wait};
use hoststream_core::Credentials;
use hoststream_harness::{Endpoint, MockHost, SimEnv, SimTransport, serve_simulated};
use hoststream_proto::{
    ServerId,
    dataqueue::{Authority, QueueAttributes, QueueName},
};
use turmoil::net::TcpListener;

const HOST: &str = "as400";

fn system(config: ClientConfig) -> HostSystem<SimTransport, SimEnv> {
    HostSystem::new(SimTransport, SimEnv::with_seed(99), config, Credentials::new("bob", "Secret1"))
        .expect("valid config")
}

#[test]
fn signon_file_and_queue_round_trip_with_latency() {
    let mut sim = turmoil::Builder::new()
        .simulation_duration(Duration::from_secs(60))
        .min_message_latency(Duration::from_millis(5))
        .max_message_latency(Duration::from_millis(50))
        .rng_seed(12345)
        .build();

    let host = MockHost::new().with_user("bob", "Secret1").with_directory("/home/bob");
    let observed = host.clone();
    sim.host(HOST, move || serve_simulated(host.clone()));

    sim.client("client", async {
        let system = system(ClientConfig::new(HOST));

        let info = system.signon().await?;
        assert_eq!(info.user_id, "BOB");

        let ifs = system.ifs().await?;
        let data: Vec<u8> = (0..150_000u32).map(|i| (i % 97) as u8).collect();
        ifs.write("/home/bob/report.bin", &data, 1208).await?;
        let contents = ifs.read("/home/bob/report.bin").await?;
        assert_eq!(contents.data.as_ref(), data.as_slice());

        let dq = system.data_queues().await?;
        let queue = QueueName::new("EVENTS", "QGPL");
        dq.create(&queue, QueueAttributes::default(), Authority::All).await?;
        dq.write(&queue, Bytes::from_static(b"ping"), None).await?;
        let entry = dq.read(&queue, Wait::Seconds(1)).await?.expect("entry written above");
        assert_eq!(entry.entry, Bytes::from_static(b"ping"));

        system.close().await;
        Ok(())
    });

    sim.run().expect("simulation should complete");
    assert_eq!(observed.file("/home/bob/report.bin").map(|d| d.len()), Some(150_000));
}

#[test]
fn silent_host_times_out_the_handshake() {
    let mut sim = turmoil::Builder::new().simulation_duration(Duration::from_secs(120)).build();

    // Accepts connections and never answers.
    sim.host(HOST, || async {
        let listener = TcpListener::bind(("0.0.0.0", ServerId::Signon.default_port())).await?;
        let mut held = Vec::new();
        loop {
            let (stream, _) = listener.accept().await?;
            held.push(stream);
        }
    });

    sim.client("client", async {
        let mut config = ClientConfig::new(HOST);
        config.session.handshake_timeout = Duration::from_secs(5);
        config.request_timeout = Duration::from_secs(10);
        let err = system(config).signon().await.expect_err("host never replies");
        assert!(err.is_transient(), "unexpected error: {err}");
        Ok(())
    });

    sim.run().expect("simulation should complete");
}

#[test]
fn unreachable_server_port_fails_cleanly() {
    let mut sim = turmoil::Builder::new().simulation_duration(Duration::from_secs(60)).build();

    // Only the signon port is served, so the file server cannot be reached.
    sim.host(HOST, || async {
        let listener = TcpListener::bind(("0.0.0.0", ServerId::Signon.default_port())).await?;
        let host = MockHost::new().with_user("bob", "Secret1");
        loop {
            let (stream, _) = listener.accept().await?;
            let host = host.clone();
            tokio::spawn(async move {
                let _ = host.serve(Endpoint::Server(ServerId::Signon), stream).await;
            });
        }
    });

    sim.client("client", async {
        let system = system(ClientConfig::new(HOST));
        system.signon().await?;
        let err = system.ifs().await.expect_err("file server port is closed");
        assert!(matches!(err, ClientError::Io(_)), "unexpected error: {err}");
        Ok(())
    });

    sim.run().expect("simulation should complete");
}
