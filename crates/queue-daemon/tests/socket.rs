mod common;

use common::TestClient;
use queue_daemon::socket;
use queue_proto::protocol::{Broadcast, Command, Outcome, PROTOCOL_VERSION};
use queue_proto::ticket::{ServiceType, TicketFilter, TicketStatus};
use std::sync::Arc;
use tokio::net::TcpListener;

async fn start() -> (std::net::SocketAddr, std::sync::Arc<queue_daemon::coordinator::Coordinator>) {
    serve(common::coordinator()).await
}

async fn serve(
    coordinator: std::sync::Arc<queue_daemon::coordinator::Coordinator>,
) -> (std::net::SocketAddr, std::sync::Arc<queue_daemon::coordinator::Coordinator>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(socket::serve(listener, coordinator.clone()));
    (addr, coordinator)
}

#[tokio::test]
async fn test_hello_carries_existing_tickets() {
    let (addr, coordinator) = start().await;
    let t = coordinator.issue_ticket(ServiceType::Ak1).await.unwrap();

    let mut client = TestClient::connect(addr).await;
    match client.next().await {
        Broadcast::Hello {
            protocol_version,
            snapshot,
        } => {
            assert_eq!(protocol_version, PROTOCOL_VERSION);
            assert_eq!(snapshot, vec![t]);
        }
        other => panic!("expected Hello, got {:?}", other),
    }
}

#[tokio::test]
async fn test_request_gets_reply_and_push() {
    let (addr, _coordinator) = start().await;
    let mut client = TestClient::connect(addr).await;
    assert!(matches!(client.next().await, Broadcast::Hello { .. }));

    client
        .send(1, Command::IssueTicket { service: ServiceType::Tka })
        .await;

    let mut pushed = None;
    let mut replied = None;
    while pushed.is_none() || replied.is_none() {
        match client.next().await {
            Broadcast::Ticket { ticket } => pushed = Some(ticket),
            Broadcast::Reply {
                request_id: 1,
                outcome: Outcome::Ok { ticket },
            } => replied = ticket,
            _ => {}
        }
    }
    assert_eq!(pushed, replied);
}

#[tokio::test]
async fn test_errors_come_back_typed() {
    let (addr, _coordinator) = start().await;
    let mut client = TestClient::connect(addr).await;
    client.next().await;

    client
        .send(
            9,
            Command::CallNext {
                counter: 1,
                service: ServiceType::Jkp,
            },
        )
        .await;
    assert_eq!(
        client.reply(9).await,
        Outcome::Err {
            error: queue_proto::error::QueueError::NoTicketsWaiting
        }
    );
}

#[tokio::test]
async fn test_subscription_filters_pushes() {
    let (addr, coordinator) = start().await;
    let mut client = TestClient::connect(addr).await;
    client.next().await;

    client
        .send(
            1,
            Command::Subscribe {
                filter: TicketFilter::statuses([TicketStatus::Waiting])
                    .with_service(ServiceType::Jkp),
            },
        )
        .await;
    assert_eq!(
        client.next().await,
        Broadcast::Snapshot { tickets: vec![] }
    );
    assert_eq!(client.reply(1).await, Outcome::Ok { ticket: None });

    coordinator.issue_ticket(ServiceType::Tka).await.unwrap();
    let jkp = coordinator.issue_ticket(ServiceType::Jkp).await.unwrap();

    match client.next().await {
        Broadcast::Ticket { ticket } => assert_eq!(ticket.id, jkp.id),
        other => panic!("expected JKP push, got {:?}", other),
    }

    // A ticket leaving the subscribed statuses is still pushed so the
    // viewer can drop it.
    let called = coordinator.call_next(3, ServiceType::Jkp).await.unwrap();
    match client.next().await {
        Broadcast::Ticket { ticket } => {
            assert_eq!(ticket.id, called.id);
            assert_eq!(ticket.status, TicketStatus::Called);
        }
        other => panic!("expected departure push, got {:?}", other),
    }
}

#[tokio::test]
async fn test_no_hello_without_a_snapshot() {
    let store = Arc::new(common::StallingStore::default());
    let (addr, coordinator) = serve(common::coordinator_with(store.clone())).await;
    coordinator.issue_ticket(ServiceType::Ak1).await.unwrap();

    store.fail_reads(true);
    let mut client = TestClient::connect(addr).await;
    client.expect_closed().await;

    store.fail_reads(false);
    let mut client = TestClient::connect(addr).await;
    match client.next().await {
        Broadcast::Hello { snapshot, .. } => assert_eq!(snapshot.len(), 1),
        other => panic!("expected Hello, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_resync_closes_the_connection() {
    let store = Arc::new(common::StallingStore::default());
    let (addr, _coordinator) = serve(common::coordinator_with(store.clone())).await;
    let mut client = TestClient::connect(addr).await;
    assert!(matches!(client.next().await, Broadcast::Hello { .. }));

    store.fail_reads(true);
    client.send(4, Command::Resync).await;
    assert!(matches!(client.reply(4).await, Outcome::Err { .. }));
    client.expect_closed().await;
}

#[tokio::test]
async fn test_oversized_frame_header_closes_the_connection() {
    let (addr, _coordinator) = start().await;
    let mut client = TestClient::connect(addr).await;
    assert!(matches!(client.next().await, Broadcast::Hello { .. }));

    client.send_raw(&u32::MAX.to_be_bytes()).await;
    client.expect_closed().await;
}
