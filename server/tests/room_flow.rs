//! End-to-end room lifecycle exercised through the registry and session
//! mutators directly, without the WebSocket transport.

use uuid::Uuid;
use watchparty_server::error::RoomError;
use watchparty_server::registry::Registry;

#[test]
fn full_session_lifecycle() {
    let registry = Registry::new();

    // Host creates a room
    let host_id = Uuid::new_v4();
    let (code, host) = registry.create_room(host_id, "Ana");
    assert_eq!(host.id, host_id);
    assert_eq!(registry.room_count(), 1);

    // A friend joins with a lower-cased code
    let friend_id = Uuid::new_v4();
    let join = registry
        .join_room(friend_id, &code.to_lowercase(), "Ben")
        .expect("join should succeed");
    assert!(join.system_message.text.contains("Ben joined"));

    // Host loads a video; both see a paused clock at zero
    let video_state = registry
        .with_room(&code, |room| {
            room.load_video("https://youtube.com/watch?v=dQw4w9WgXcQ", "Ana")
                .unwrap();
            room.video_state()
        })
        .unwrap();
    assert_eq!(video_state.video_id, "dQw4w9WgXcQ");
    assert!(!video_state.is_playing);
    assert_eq!(video_state.current_time, 0.0);

    // Playback driving bumps seq every time
    let seqs: Vec<u64> = registry
        .with_room(&code, |room| {
            let mut seqs = Vec::new();
            room.apply_play(0.0);
            seqs.push(room.playback.seq);
            room.apply_seek(90.0);
            seqs.push(room.playback.seq);
            room.apply_pause(92.0);
            seqs.push(room.playback.seq);
            seqs
        })
        .unwrap();
    assert!(seqs.windows(2).all(|pair| pair[1] > pair[0]));

    // Queue two videos, then the video ends: exactly one advance even
    // with a duplicate signal racing in
    let (first_queued, popped) = registry
        .with_room(&code, |room| {
            let first = room.enqueue("https://youtu.be/aaaaaaaaaaa", "Ben").unwrap();
            room.enqueue("https://youtu.be/bbbbbbbbbbb", "Ben").unwrap();
            let popped = room.advance_queue().expect("first signal advances");
            assert!(room.advance_queue().is_none(), "duplicate signal ignored");
            (first, popped)
        })
        .unwrap();
    assert_eq!(popped.id, first_queued.id);
    let state = registry.with_room(&code, |room| room.video_state()).unwrap();
    assert_eq!(state.video_id, "aaaaaaaaaaa");
    assert!(!state.is_playing);

    // Chat flows both ways
    registry
        .with_room(&code, |room| {
            assert!(room.append_chat(host_id, "ready?".to_string()).is_some());
            assert!(room.append_chat(friend_id, "ready!".to_string()).is_some());
        })
        .unwrap();

    // Host leaves: the friend inherits the room
    let leave = registry.leave_room(host_id).unwrap();
    assert!(!leave.destroyed);
    assert_eq!(leave.new_host_id, Some(friend_id));

    // Last participant leaves: the room is gone and the code is dead
    let leave = registry.leave_room(friend_id).unwrap();
    assert!(leave.destroyed);
    assert_eq!(registry.room_count(), 0);
    assert_eq!(
        registry.join_room(Uuid::new_v4(), &code, "Cam").unwrap_err(),
        RoomError::RoomNotFound
    );
}

#[test]
fn queue_full_surfaces_to_caller_only() {
    let registry = Registry::new();
    let host_id = Uuid::new_v4();
    let (code, _) = registry.create_room(host_id, "Ana");

    registry
        .with_room(&code, |room| {
            for _ in 0..50 {
                room.enqueue("dQw4w9WgXcQ", "Ana").unwrap();
            }
            let err = room.enqueue("dQw4w9WgXcQ", "Ana").unwrap_err();
            assert!(matches!(err, RoomError::QueueFull(50)));
            assert_eq!(room.queue.len(), 50);
        })
        .unwrap();
}
