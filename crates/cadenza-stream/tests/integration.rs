//! End-to-end tests over real FIFOs.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use cadenza_config::StreamSettings;
use cadenza_stream::{Entity, EntityKind, FifoPaths, FrameData, FramedStream, StreamError};
use tempfile::TempDir;

fn settings() -> StreamSettings {
    StreamSettings {
        poll_interval_ms: 10,
        ..StreamSettings::default()
    }
}

/// Wait until the server has created both FIFOs.
fn wait_for_fifos(dir: &Path) {
    let paths = FifoPaths::in_dir(dir);
    let deadline = Instant::now() + Duration::from_secs(5);
    while !(paths.c2s.exists() && paths.s2c.exists()) {
        assert!(Instant::now() < deadline, "server never created FIFOs");
        thread::sleep(Duration::from_millis(5));
    }
}

/// Open the client ends by hand so tests can write raw bytes.
fn raw_client(dir: &Path) -> (File, File) {
    wait_for_fifos(dir);
    let paths = FifoPaths::in_dir(dir);
    let reader = File::open(&paths.s2c).unwrap();
    let writer = OpenOptions::new().write(true).open(&paths.c2s).unwrap();
    (reader, writer)
}

fn spawn_server<T: Send + 'static>(
    dir: &Path,
    f: impl FnOnce(&mut FramedStream) -> T + Send + 'static,
) -> thread::JoinHandle<T> {
    let dir = dir.to_path_buf();
    thread::spawn(move || {
        let mut server = FramedStream::server(&dir, &settings()).unwrap();
        f(&mut server)
    })
}

#[test]
fn test_large_payload_echo() {
    let dir = TempDir::new().unwrap();
    let server = spawn_server(dir.path(), |server| {
        let frame = server.receive_frame().unwrap();
        server.send_frame(&frame).unwrap();
        server.receive_frame().unwrap_err()
    });

    wait_for_fifos(dir.path());
    let mut client = FramedStream::client(dir.path(), &settings()).unwrap();
    let payload = b"123".repeat(100_000);
    client.send_frame(&payload).unwrap();
    let echo = client.receive_frame().unwrap();
    assert_eq!(echo.len(), 300_000);
    assert_eq!(echo, payload);
    client.close().unwrap();

    let last = server.join().unwrap();
    assert!(last.is_closed(), "expected Closed, got {last:?}");
    assert!(matches!(client.send_frame(b"late"), Err(StreamError::Closed)));
}

#[test]
fn test_close_sentinel_unblocks_server_read() {
    let dir = TempDir::new().unwrap();
    let server = spawn_server(dir.path(), |server| server.receive_frame());

    wait_for_fifos(dir.path());
    let mut client = FramedStream::client(dir.path(), &settings()).unwrap();
    thread::sleep(Duration::from_millis(30));
    client.close().unwrap();

    assert!(matches!(server.join().unwrap(), Err(StreamError::Closed)));
}

#[test]
fn test_close_handle_unblocks_idle_read() {
    let dir = TempDir::new().unwrap();
    let (tx, rx) = std::sync::mpsc::channel();
    let server = spawn_server(dir.path(), move |server| {
        tx.send(server.close_handle()).unwrap();
        server.receive_frame()
    });

    let (_reader, _writer) = raw_client(dir.path());
    let handle = rx.recv().unwrap();
    thread::sleep(Duration::from_millis(30));
    handle.close();

    assert!(matches!(server.join().unwrap(), Err(StreamError::Closed)));
}

#[test]
fn test_malformed_header_is_stream_error() {
    let dir = TempDir::new().unwrap();
    let server = spawn_server(dir.path(), |server| server.receive_frame());

    let (_reader, mut writer) = raw_client(dir.path());
    writer.write_all(b"#XX=3\nabc#END\n").unwrap();

    assert!(matches!(
        server.join().unwrap(),
        Err(StreamError::MalformedHeader(_))
    ));
}

#[test]
fn test_payload_longer_than_declared_is_detected() {
    let dir = TempDir::new().unwrap();
    let server = spawn_server(dir.path(), |server| server.receive_frame());

    let (_reader, mut writer) = raw_client(dir.path());
    writer.write_all(b"#FR=3\nabcdefgh#END\n").unwrap();

    assert!(matches!(
        server.join().unwrap(),
        Err(StreamError::MissingTrailer { len: 3 })
    ));
}

#[test]
fn test_hangup_mid_frame_is_not_close() {
    let dir = TempDir::new().unwrap();
    let server = spawn_server(dir.path(), |server| server.receive_frame());

    let (reader, mut writer) = raw_client(dir.path());
    writer.write_all(b"#FR=10\nabc").unwrap();
    drop(writer);
    drop(reader);

    assert!(matches!(server.join().unwrap(), Err(StreamError::HungUp)));
}

#[test]
fn test_oversized_frame_rejected() {
    let dir = TempDir::new().unwrap();
    let server = spawn_server(dir.path(), |server| server.receive_frame());

    let (_reader, mut writer) = raw_client(dir.path());
    let declared = StreamSettings::default().max_frame_len + 1;
    writer
        .write_all(format!("#FR={declared}\n").as_bytes())
        .unwrap();

    assert!(matches!(
        server.join().unwrap(),
        Err(StreamError::FrameTooLarge { .. })
    ));
}

#[test]
fn test_frame_data_exchange_and_cleanup() {
    let dir = TempDir::new().unwrap();
    let server = spawn_server(dir.path(), |server| {
        let data = server.receive_data().unwrap();
        server.send_data(&data).unwrap();
        data
    });

    wait_for_fifos(dir.path());
    let mut client = FramedStream::client(dir.path(), &settings()).unwrap();
    let samples: Vec<u8> = [0.25f32, -0.25].iter().flat_map(|s| s.to_le_bytes()).collect();
    let frame = FrameData::new(512, 2).with_entity(Entity::new("left", EntityKind::Audio, samples));
    client.send_data(&frame).unwrap();
    assert_eq!(client.receive_data().unwrap(), frame);

    assert_eq!(server.join().unwrap(), frame);
    let paths = FifoPaths::in_dir(dir.path());
    assert!(!paths.c2s.exists(), "server must remove its FIFOs on drop");
}
