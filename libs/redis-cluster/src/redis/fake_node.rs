//! In-process single-node Redis cluster for unit tests
//!
//! Speaks just enough RESP for the cluster client: `PING`, `CLUSTER SLOTS`
//! (every slot served by this node), and `+OK` for anything else.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Counters {
    accepted: AtomicUsize,
    closed: AtomicUsize,
    ping_fails: AtomicBool,
}

pub(crate) struct FakeNode {
    addr: SocketAddr,
    counters: Arc<Counters>,
}

impl FakeNode {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let counters = Arc::new(Counters::default());

        let shared = counters.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                shared.accepted.fetch_add(1, Ordering::SeqCst);

                let counters = shared.clone();
                thread::spawn(move || {
                    let _ = serve(stream, addr, &counters);
                    counters.closed.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        Self { addr, counters }
    }

    /// Host list for `ClusterConfig::from_hosts`
    pub fn hosts(&self) -> String {
        self.addr.to_string()
    }

    pub fn accepted(&self) -> usize {
        self.counters.accepted.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    /// Connections accepted and not yet closed by the client
    pub fn open(&self) -> usize {
        self.accepted() - self.closed()
    }

    /// Answer PING with an error from now on
    pub fn fail_pings(&self) {
        self.counters.ping_fails.store(true, Ordering::SeqCst);
    }

    /// Poll `condition` until it holds or `timeout` passes
    pub fn wait_for(&self, timeout: Duration, condition: impl Fn(&Self) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition(self) {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        condition(self)
    }
}

fn serve(stream: TcpStream, addr: SocketAddr, counters: &Counters) -> io::Result<()> {
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);

    while let Some(args) = read_command(&mut reader)? {
        let name = args.first().map(|a| a.to_ascii_uppercase()).unwrap_or_default();
        let sub = args.get(1).map(|a| a.to_ascii_uppercase()).unwrap_or_default();

        let reply = match (name.as_str(), sub.as_str()) {
            ("PING", _) if counters.ping_fails.load(Ordering::SeqCst) => {
                "-ERR node is down\r\n".to_string()
            }
            ("PING", _) => "+PONG\r\n".to_string(),
            ("CLUSTER", "SLOTS") => slots_reply(addr),
            _ => "+OK\r\n".to_string(),
        };
        writer.write_all(reply.as_bytes())?;
    }
    Ok(())
}

fn slots_reply(addr: SocketAddr) -> String {
    let ip = addr.ip().to_string();
    format!(
        "*1\r\n*3\r\n:0\r\n:16383\r\n*2\r\n${}\r\n{}\r\n:{}\r\n",
        ip.len(),
        ip,
        addr.port()
    )
}

fn read_command<R: BufRead>(reader: &mut R) -> io::Result<Option<Vec<String>>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }

    let count = header(&line, '*')?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line)?;
        let len = header(&line, '$')?;

        let mut buf = vec![0; len + 2];
        reader.read_exact(&mut buf)?;
        buf.truncate(len);
        args.push(String::from_utf8_lossy(&buf).into_owned());
    }
    Ok(Some(args))
}

fn header(line: &str, prefix: char) -> io::Result<usize> {
    line.trim_end()
        .strip_prefix(prefix)
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, line.to_string()))
}
