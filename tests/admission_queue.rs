// tests/admission_queue.rs

use agentflow::engine::AdmissionQueue;

#[test]
fn repeated_requests_coalesce() {
    let mut queue = AdmissionQueue::new();
    assert!(queue.request("p1"));
    assert!(!queue.request("p1"));
    assert!(queue.request("p2"));

    assert_eq!(queue.len(), 2);
    assert!(queue.contains("p1"));
}

#[test]
fn serviced_process_goes_to_the_back() {
    let mut queue = AdmissionQueue::new();
    queue.request("p1");
    queue.request("p2");

    assert_eq!(queue.pop().as_deref(), Some("p1"));
    assert!(!queue.contains("p1"));

    // p1 needs another pass; p2 is still ahead of it.
    assert!(queue.request("p1"));
    assert_eq!(queue.pop().as_deref(), Some("p2"));
    assert_eq!(queue.pop().as_deref(), Some("p1"));
    assert!(queue.pop().is_none());
    assert!(queue.is_empty());
}

#[test]
fn remove_drops_a_queued_pass() {
    let mut queue = AdmissionQueue::new();
    queue.request("p1");
    queue.request("p2");
    queue.remove("p1");
    queue.remove("ghost");

    assert_eq!(queue.len(), 1);
    assert_eq!(queue.pop().as_deref(), Some("p2"));
}
