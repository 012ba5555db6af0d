use criterion::{black_box, criterion_group, criterion_main, Criterion};
use parley_chat::broadcast::{BroadcastGroup, Outbound};
use parley_chat::history::MessageLog;
use parley_chat::protocol::{ChatMessage, ClientEvent, ServerEvent};
use parley_chat::room::room_id_for;
use parley_chat::storage::{RocksStore, RoomStore, StoreConfig};
use uuid::Uuid;

fn bench_room_id_derivation(c: &mut Criterion) {
    let a = Uuid::new_v4().to_string();
    let b = Uuid::new_v4().to_string();

    c.bench_function("room_id_for_uuid_pair", |bench| {
        bench.iter(|| {
            black_box(room_id_for(black_box(&a), black_box(&b)).unwrap());
        })
    });
}

fn bench_message_encode(c: &mut Criterion) {
    let event = ServerEvent::Message {
        room_id: "a--b".to_string(),
        msg: ChatMessage::text("m1", "a", "Alice", "a typical short chat line", 1_700_000_000_000),
    };

    c.bench_function("message_event_encode", |bench| {
        bench.iter(|| {
            black_box(black_box(&event).encode().unwrap());
        })
    });
}

fn bench_message_decode(c: &mut Criterion) {
    let event = ClientEvent::Message {
        room_id: "a--b".to_string(),
        msg: ChatMessage::text("m1", "a", "Alice", "a typical short chat line", 1_700_000_000_000),
    };
    let encoded = event.encode().unwrap();

    c.bench_function("message_event_decode", |bench| {
        bench.iter(|| {
            black_box(ClientEvent::decode(black_box(&encoded)).unwrap());
        })
    });
}

fn bench_log_append_1000(c: &mut Criterion) {
    c.bench_function("log_append_1000", |bench| {
        bench.iter(|| {
            let mut log = MessageLog::new();
            for i in 0..1000 {
                let id = format!("m{i}");
                log.append(ChatMessage::text(id, "a", "Alice", "hello", i));
            }
            black_box(log.len());
        })
    });
}

fn bench_log_visible_filter_1000(c: &mut Criterion) {
    let mut log = MessageLog::new();
    for i in 0..1000u64 {
        let id = format!("m{i}");
        log.append(ChatMessage::text(id, "a", "Alice", "hello", i));
    }
    // Hide every tenth message for the viewer
    let targets: std::collections::BTreeSet<String> = ["viewer".to_string()].into();
    for i in (0..1000u64).step_by(10) {
        log.mark_deleted_for(&format!("m{i}"), &targets);
    }

    c.bench_function("log_visible_filter_1000", |bench| {
        bench.iter(|| {
            black_box(log.visible_for(black_box("viewer")));
        })
    });
}

fn bench_fanout(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("fanout_1000_frames_2_subscribers", |bench| {
        bench.iter(|| {
            rt.block_on(async {
                let group = BroadcastGroup::new(2048);
                let _rx_a = group.subscribe(Uuid::new_v4(), "a").await;
                let _rx_b = group.subscribe(Uuid::new_v4(), "b").await;

                let origin = Uuid::new_v4();
                for i in 0..1000u64 {
                    let frame = format!("frame-{i}");
                    group.send(black_box(Outbound::room(origin, frame)));
                }
            });
        })
    });
}

fn bench_store_append(c: &mut Criterion) {
    let dir = std::env::temp_dir().join(format!("parley_bench_append_{}", Uuid::new_v4()));
    let store = RocksStore::open(StoreConfig::for_testing(dir.clone())).unwrap();

    c.bench_function("rocks_append_message", |bench| {
        let mut i = 0u64;
        bench.iter(|| {
            let id = format!("m{i}");
            store
                .append_message("a--b", ChatMessage::text(id, "a", "Alice", "hello", i))
                .unwrap();
            i += 1;
        })
    });

    let _ = std::fs::remove_dir_all(&dir);
}

criterion_group!(
    benches,
    bench_room_id_derivation,
    bench_message_encode,
    bench_message_decode,
    bench_log_append_1000,
    bench_log_visible_filter_1000,
    bench_fanout,
    bench_store_append,
);
criterion_main!(benches);
