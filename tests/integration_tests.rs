//! Integration tests for server discovery over real sockets
//!
//! These tests run the lists against scripted game servers on loopback.

use bincode::{deserialize, serialize};
use browser::discovery::Discovery;
use browser::driver::{self, Shutdown, StopReason};
use browser::favorites::{FavoriteServerList, MemoryFavorites};
use browser::lan::LanServerList;
use browser::server_list::{ChangeEvent, Timing};
use browser::transport::{Inbound, UdpTransport};
use browser::wan::{HttpDirectory, WanServerList};
use shared::Packet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;

/// Game server stand-in answering up to `max_replies` queries
async fn spawn_game_server(map: &str, max_replies: usize) -> (u16, Arc<AtomicUsize>) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();
    let queries = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&queries);
    let map = map.to_string();

    tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        loop {
            let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                continue;
            };
            if !matches!(deserialize::<Packet>(&buf[..len]), Ok(Packet::Query)) {
                continue;
            }
            let seen = counter.fetch_add(1, Ordering::SeqCst);
            if seen >= max_replies {
                continue;
            }
            let reply = Packet::Info {
                map: Some(map.clone()),
                players: Some(2),
                bots: Some(1),
                max_players: Some(8),
            };
            let _ = socket.send_to(&serialize(&reply).unwrap(), from).await;
        }
    });

    (port, queries)
}

/// Serves `body` as a plain-text HTTP response to every connection
async fn spawn_directory(body: String) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                continue;
            };
            let body = body.clone();
            tokio::spawn(async move {
                let mut request = [0u8; 1024];
                let _ = stream.read(&mut request).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    format!("http://{}/servers.txt", addr)
}

/// Runs `list` for `duration` on the real driver
async fn drive_for<D: Discovery>(
    list: &mut D,
    inbound: &mut mpsc::UnboundedReceiver<Inbound>,
    duration: Duration,
) -> StopReason {
    let (mut shutdown, shutdown_rx) = Shutdown::channel();
    tokio::spawn(async move {
        tokio::time::sleep(duration).await;
        shutdown.trigger();
    });
    driver::run(list, inbound, Duration::from_millis(10), shutdown_rx).await
}

/// Local directories must not be routed through a proxy from the environment
fn local_directory(url: String) -> Arc<HttpDirectory> {
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    Arc::new(HttpDirectory::with_client(client, url))
}

fn fast_timing() -> Timing {
    Timing {
        query_interval: Duration::from_millis(50),
        query_timeout: Duration::from_millis(100),
    }
}

/// FAVORITES OVER UDP
mod favorites_tests {
    use super::*;

    #[tokio::test]
    async fn responsive_favorite_gets_ping_and_info() {
        let (port, queries) = spawn_game_server("archipelago", usize::MAX).await;
        let (transport, mut inbound) = UdpTransport::open("127.0.0.1:0").await.unwrap();
        let store = MemoryFavorites::new(vec![format!("127.0.0.1:{}", port)]);

        let mut list =
            FavoriteServerList::open(transport, store, 2000, fast_timing(), Instant::now()).unwrap();
        let reason = drive_for(&mut list, &mut inbound, Duration::from_millis(300)).await;

        assert_eq!(reason, StopReason::Shutdown);
        let server = list.servers().find("127.0.0.1", port).unwrap();
        assert!(server.ping.is_some());
        assert_eq!(server.map.as_deref(), Some("archipelago"));
        assert_eq!(server.players, Some(2));
        assert_eq!(server.bots, Some(1));
        assert_eq!(server.max_players, Some(8));
        assert!(queries.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn silent_favorite_times_out_once() {
        let (port, _) = spawn_game_server("delta", 1).await;
        let (transport, mut inbound) = UdpTransport::open("127.0.0.1:0").await.unwrap();
        let store = MemoryFavorites::new(vec![format!("127.0.0.1:{}", port)]);

        let mut list =
            FavoriteServerList::open(transport, store, 2000, fast_timing(), Instant::now()).unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        list.servers_mut()
            .subscribe(move |event| sink.lock().unwrap().push(event.clone()));

        drive_for(&mut list, &mut inbound, Duration::from_millis(600)).await;

        let server = list.servers().find("127.0.0.1", port).unwrap();
        assert_eq!(server.ping, None);
        assert_eq!(server.map.as_deref(), Some("delta"));

        let events = events.lock().unwrap();
        let timeouts = events
            .iter()
            .filter(|e| matches!(e, ChangeEvent::TimedOut { .. }))
            .count();
        let replies = events
            .iter()
            .filter(|e| matches!(e, ChangeEvent::Responded { .. }))
            .count();
        assert_eq!(replies, 1);
        assert_eq!(timeouts, 1);
    }
}

/// LAN DISCOVERY OVER UDP
mod lan_tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reply_adds_server() {
        let (port, _) = spawn_game_server("lagoon", usize::MAX).await;
        let (transport, mut inbound) = UdpTransport::open("127.0.0.1:0").await.unwrap();

        // Loopback stands in for the broadcast address
        let mut lan = LanServerList::new(transport, port, fast_timing(), Duration::from_secs(5))
            .with_broadcast_address("127.0.0.1");
        drive_for(&mut lan, &mut inbound, Duration::from_millis(300)).await;

        assert_eq!(lan.servers().len(), 1);
        let server = lan.servers().find("127.0.0.1", port).unwrap();
        assert!(server.ping.is_some());
        assert_eq!(server.map.as_deref(), Some("lagoon"));
    }
}

/// DIRECTORY DISCOVERY OVER HTTP
mod wan_tests {
    use super::*;

    #[tokio::test]
    async fn directory_servers_are_listed_and_polled() {
        let (port, _) = spawn_game_server("mainland", usize::MAX).await;
        let body = format!(
            "127.0.0.1:{}\nnot-an-ip-or-port-entry-that-still-has-a-colon:abc\n10.255.255.1:7777\n",
            port
        );
        let url = spawn_directory(body).await;

        let (transport, mut inbound) = UdpTransport::open("127.0.0.1:0").await.unwrap();
        let mut wan = WanServerList::new(
            transport,
            local_directory(url),
            2000,
            fast_timing(),
            Duration::from_secs(60),
        );

        drive_for(&mut wan, &mut inbound, Duration::from_millis(500)).await;

        assert_eq!(wan.servers().len(), 2);
        let live = wan.servers().find("127.0.0.1", port).unwrap();
        assert!(live.ping.is_some());
        assert_eq!(live.map.as_deref(), Some("mainland"));
        let unreachable = wan.servers().find("10.255.255.1", 7777).unwrap();
        assert_eq!(unreachable.ping, None);
    }

    #[tokio::test]
    async fn unreachable_directory_leaves_list_empty() {
        // Bind then drop to get a port nobody listens on
        let url = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            format!("http://{}/servers.txt", listener.local_addr().unwrap())
        };

        let (transport, _inbound) = UdpTransport::open("127.0.0.1:0").await.unwrap();
        let mut wan = WanServerList::new(
            transport,
            local_directory(url),
            2000,
            fast_timing(),
            Duration::from_secs(60),
        );

        assert!(wan.refresh().await.is_err());
        assert!(wan.servers().is_empty());
    }
}

/// TRANSPORT LIFECYCLE
mod transport_tests {
    use super::*;

    #[tokio::test]
    async fn ended_list_ignores_late_replies() {
        let (port, _) = spawn_game_server("coast", usize::MAX).await;
        let (transport, mut inbound) = UdpTransport::open("127.0.0.1:0").await.unwrap();
        let store = MemoryFavorites::new(vec![format!("127.0.0.1:{}", port)]);
        let mut list =
            FavoriteServerList::open(transport, store, 2000, fast_timing(), Instant::now()).unwrap();

        list.end();
        list.end();

        tokio::time::sleep(Duration::from_millis(100)).await;
        // Receiver task is gone, so the channel eventually closes
        while let Some(inbound) = inbound.recv().await {
            list.handle_inbound(&inbound, Instant::now());
        }
        assert_eq!(list.servers().get(0).unwrap().ping, None);
    }

    #[test]
    fn malformed_datagrams_are_dropped() {
        tokio_test::block_on(async {
            let (transport, mut inbound) = UdpTransport::open("127.0.0.1:0").await.unwrap();
            let target = transport.local_addr();

            let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            sender.send_to(&[0xff, 0xfe, 0xfd], target).await.unwrap();
            let info = Packet::Info {
                map: None,
                players: None,
                bots: None,
                max_players: Some(4),
            };
            sender.send_to(&serialize(&info).unwrap(), target).await.unwrap();

            let received = tokio::time::timeout(Duration::from_secs(1), inbound.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(received.packet, info);
            assert_eq!(received.from, sender.local_addr().unwrap());
        });
    }
}
