// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;
use tokio::io::AsyncReadExt;

#[derive(Clone, Default)]
struct Buffer(Arc<Mutex<Vec<u8>>>);

impl Buffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }
}

impl Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Broken;

impl Write for Broken {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::other("broken"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn fan_out_writes_every_sink_even_after_a_failure() {
    let a = Buffer::default();
    let b = Buffer::default();
    let sinks: Vec<LogSink> = vec![Box::new(a.clone()), Box::new(Broken), Box::new(b.clone())];
    let mut fan = FanOut::new(sinks);

    assert!(fan.write(b"hello\n").is_err());
    assert_eq!(a.contents(), "hello\n");
    assert_eq!(b.contents(), "hello\n");
}

#[test]
fn shared_log_clones_write_to_one_sink() {
    let buf = Buffer::default();
    let log = SharedLog::new(buf.clone());
    let mut first = log.clone();
    let mut second = log;
    first.write_all(b"a").unwrap();
    second.write_all(b"b").unwrap();
    assert_eq!(buf.contents(), "ab");
}

#[test]
fn local_log_appends_and_creates_directories() {
    let dir = tempfile::tempdir().unwrap();
    let logs = dir.path().join("jobs").join("repo");
    {
        let mut f = open_local_log(&logs, "run-1").unwrap();
        f.write_all(b"one\n").unwrap();
    }
    {
        let mut f = open_local_log(&logs, "run-1").unwrap();
        f.write_all(b"two\n").unwrap();
    }
    let content = std::fs::read_to_string(logs.join("run-1.log")).unwrap();
    assert_eq!(content, "one\ntwo\n");
}

#[test]
fn json_log_emits_one_record_per_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("stream.jsonl");
    {
        let mut log = JsonLineLog::open(&path).unwrap();
        log.write_all(b"first li").unwrap();
        log.write_all(b"ne\nsecond\nthird").unwrap();
    }
    let content = std::fs::read_to_string(&path).unwrap();
    let messages: Vec<String> = content
        .lines()
        .map(|l| {
            let v: serde_json::Value = serde_json::from_str(l).unwrap();
            v["message"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(messages, vec!["first line", "second", "third"]);
}

#[tokio::test]
async fn stream_relays_output_until_closed() {
    let server = StreamServer::bind(("127.0.0.1", 0)).await.unwrap();
    let port = server.port().unwrap();
    let mut client = tokio::net::TcpStream::connect(("127.0.0.1", port))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut writer = server.writer();
    writer.write_all(b"hello\n").unwrap();
    server.close();
    server.close();
    writer.write_all(b"dropped\n").unwrap();

    let mut received = String::new();
    tokio::time::timeout(Duration::from_secs(5), client.read_to_string(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, "hello\n");
    assert!(server.is_closed());
}

#[test]
fn detached_stream_accepts_writes() {
    let server = StreamServer::detached();
    assert_eq!(server.port(), None);
    server.writer().write_all(b"nobody listens").unwrap();
}
