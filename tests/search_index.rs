use chattyd::config::{DispatcherConfig, SearchConfig};
use chattyd::dispatch::Dispatcher;
use chattyd::event::{Event, EventData, ModerationFlag, Post};
use chattyd::search::{SearchIndex, SearchQuery};
use chattyd::store::{MemoryPostStore, PostStore};
use chrono::Utc;
use std::sync::Arc;

fn post(id: u64, parent_id: u64, author: &str, body: &str) -> Post {
    Post {
        id,
        thread_id: if parent_id == 0 { id } else { parent_id },
        parent_id,
        author: author.to_string(),
        category: ModerationFlag::OnTopic,
        date: Utc::now(),
        body: body.to_string(),
    }
}

fn new_post(event_id: u64, post: Post, parent_author: &str) -> Event {
    Event::new(
        event_id,
        EventData::NewPost {
            post_id: post.id,
            post,
            parent_author: parent_author.to_string(),
        },
    )
}

fn bounded(max_posts: usize, prune_posts: usize) -> SearchIndex {
    SearchIndex::new(SearchConfig {
        max_posts,
        prune_posts,
    })
    .unwrap()
}

fn ids(posts: &[Post]) -> Vec<u64> {
    posts.iter().map(|p| p.id).collect()
}

#[test]
fn eviction_uses_hysteresis() {
    let index = bounded(10, 8);
    for id in 1..=9 {
        index.on_new_event(&new_post(id, post(id, 0, "poster", &format!("topic{id}")), ""));
    }
    assert_eq!(index.len(), 9);

    // The post that reaches the ceiling triggers a rebuild down to the newest 8.
    index.on_new_event(&new_post(10, post(10, 0, "poster", "topic10"), ""));
    assert_eq!(index.len(), 8);
    assert!(index.search(&SearchQuery::terms("topic1")).is_empty());
    assert!(index.search(&SearchQuery::terms("topic2")).is_empty());
    assert_eq!(ids(&index.search(&SearchQuery::terms("topic3"))), vec![3]);

    index.on_new_event(&new_post(11, post(11, 0, "poster", "topic11"), ""));
    assert_eq!(index.len(), 9);
    assert_eq!(ids(&index.search(&SearchQuery::terms("topic3"))), vec![3]);

    index.on_new_event(&new_post(12, post(12, 0, "poster", "topic12"), ""));
    assert_eq!(index.len(), 8);
    assert!(index.search(&SearchQuery::terms("topic4")).is_empty());
    assert_eq!(
        ids(&index.search(&SearchQuery::author("poster").page(0, 100))),
        (5..=12).rev().collect::<Vec<u64>>()
    );
}

#[test]
fn rebuild_only_keeps_parent_authors_inside_the_window() {
    let index = bounded(10, 8);
    index.on_new_event(&new_post(1, post(1, 0, "root", "opening words"), ""));
    for id in 2..=8 {
        index.on_new_event(&new_post(id, post(id, 1, &format!("r{id}"), "reply"), "root"));
    }
    index.on_new_event(&new_post(9, post(9, 1, "nine", "reply"), "root"));
    assert_eq!(index.search(&SearchQuery::parent_author("root")).len(), 8);

    index.on_new_event(&new_post(10, post(10, 9, "ten", "reply to nine"), "nine"));
    assert_eq!(index.len(), 8);

    // Post 1 was evicted, so nobody answers to "root" any more.
    assert!(index.search(&SearchQuery::parent_author("root")).is_empty());
    // Post 9 survived, so post 10 still answers to "nine".
    assert_eq!(ids(&index.search(&SearchQuery::parent_author("nine"))), vec![10]);
}

#[test]
fn stemmed_terms_case_and_markup() {
    let index = bounded(100, 50);
    index.on_new_event(&new_post(
        1,
        post(1, 0, "Shacker", "<b>Running</b> the Numbers, again!"),
        "",
    ));
    index.on_new_event(&new_post(2, post(2, 0, "other", "runs all day"), ""));

    assert_eq!(ids(&index.search(&SearchQuery::terms("RUN"))), vec![2, 1]);
    assert_eq!(ids(&index.search(&SearchQuery::terms("numbers"))), vec![1]);
    assert_eq!(ids(&index.search(&SearchQuery::terms("again"))), vec![1]);
    // Tags are not words.
    assert!(index.search(&SearchQuery::terms("b")).is_empty());
    assert_eq!(ids(&index.search(&SearchQuery::author("shacker"))), vec![1]);
}

#[test]
fn category_changes_move_posts_between_sets() {
    let index = bounded(100, 50);
    index.on_new_event(&new_post(1, post(1, 0, "amy", "weekend plans"), ""));
    index.on_new_event(&new_post(2, post(2, 0, "amy", "weekend photos"), ""));
    index.on_new_event(&Event::new(
        3,
        EventData::CategoryChange {
            post_id: 2,
            category: ModerationFlag::NotWorkSafe,
        },
    ));

    assert_eq!(
        ids(&index.search(&SearchQuery::category(ModerationFlag::OnTopic))),
        vec![1]
    );
    assert_eq!(
        ids(&index.search(&SearchQuery::category(ModerationFlag::NotWorkSafe))),
        vec![2]
    );
    assert_eq!(
        ids(&index.search(
            &SearchQuery::terms("weekend").with_category(ModerationFlag::NotWorkSafe)
        )),
        vec![2]
    );
}

#[test]
fn nuked_post_disappears_from_every_query() {
    let index = bounded(100, 50);
    index.on_new_event(&new_post(1, post(1, 0, "ben", "hello"), ""));
    index.on_new_event(&new_post(2, post(2, 1, "cat", "hello back"), "ben"));
    index.on_new_event(&new_post(3, post(3, 0, "ben", "hello again"), ""));
    index.on_new_event(&Event::new(
        4,
        EventData::CategoryChange {
            post_id: 3,
            category: ModerationFlag::Nuked,
        },
    ));

    assert_eq!(ids(&index.search(&SearchQuery::terms("hello"))), vec![2, 1]);
    assert_eq!(ids(&index.search(&SearchQuery::author("ben"))), vec![1]);
    assert!(index
        .search(&SearchQuery::category(ModerationFlag::OnTopic))
        .iter()
        .all(|p| p.id != 3));
    // Paging counts only visible posts.
    assert_eq!(ids(&index.search(&SearchQuery::terms("hello").page(1, 1))), vec![1]);
}

#[test]
fn backfill_loads_newest_posts_with_parent_authors() {
    let store = MemoryPostStore::detached();
    let root = store.post_comment("root", 0, "thread starter").unwrap();
    let reply = store.post_comment("first", root, "first reply").unwrap();
    store.post_comment("second", reply, "second reply").unwrap();
    store.set_post_category(reply, ModerationFlag::Informative).unwrap();

    let index = bounded(100, 50);
    assert_eq!(index.start(&store).unwrap(), 3);
    assert_eq!(ids(&index.search(&SearchQuery::parent_author("root"))), vec![2]);
    assert_eq!(ids(&index.search(&SearchQuery::parent_author("first"))), vec![3]);
    assert_eq!(
        ids(&index.search(&SearchQuery::category(ModerationFlag::Informative))),
        vec![2]
    );
}

#[test]
fn backfill_respects_the_bound() {
    let store = MemoryPostStore::detached();
    let mut last = 0;
    for i in 1..=5 {
        last = store.post_comment(&format!("u{i}"), last, "chain").unwrap();
    }
    assert_eq!(store.newest_post_id().unwrap(), 5);

    // Reads the newest 4 and then evicts down to 2 on reaching the ceiling.
    let index = bounded(4, 2);
    assert_eq!(index.start(&store).unwrap(), 2);
    assert_eq!(ids(&index.search(&SearchQuery::terms("chain"))), vec![5, 4]);
    assert_eq!(ids(&index.search(&SearchQuery::parent_author("u4"))), vec![5]);
    assert!(index.search(&SearchQuery::parent_author("u3")).is_empty());
}

#[test]
fn empty_store_backfills_nothing() {
    let store = MemoryPostStore::detached();
    let index = bounded(10, 5);
    assert_eq!(index.start(&store).unwrap(), 0);
    assert!(index.is_empty());
}

#[tokio::test]
async fn posts_flow_from_store_through_dispatcher_into_the_index() {
    let dispatcher = Dispatcher::new(DispatcherConfig::default()).unwrap();
    let store = MemoryPostStore::new(dispatcher.clone());
    let index = Arc::new(bounded(100, 50));
    index.start(&store).unwrap();
    dispatcher.subscribe(index.clone());
    dispatcher.start().unwrap();

    let first = store.post_comment("user", 0, "new post").unwrap();
    let second = store.post_comment("mod", first, "new reply").unwrap();
    store
        .set_post_category(second, ModerationFlag::Informative)
        .unwrap();
    let stats = dispatcher.stats().await.unwrap();
    assert_eq!(stats.processed_total, 3);

    assert_eq!(ids(&index.search(&SearchQuery::terms("posting"))), vec![first]);
    assert_eq!(
        ids(&index.search(&SearchQuery::category(ModerationFlag::Informative))),
        vec![second]
    );
    assert_eq!(ids(&index.search(&SearchQuery::author("mod"))), vec![second]);
    assert_eq!(ids(&index.search(&SearchQuery::parent_author("user"))), vec![second]);

    let events = dispatcher.poll_for_event(0).unwrap();
    let kinds: Vec<String> = events.iter().map(|e| e.event_type().to_string()).collect();
    assert_eq!(kinds, vec!["newPost", "newPost", "categoryChange"]);

    store.set_post_category(first, ModerationFlag::Nuked).unwrap();
    dispatcher.stats().await.unwrap();
    assert!(index.search(&SearchQuery::author("user")).is_empty());
    assert!(index
        .search(&SearchQuery::category(ModerationFlag::OnTopic))
        .is_empty());

    dispatcher.shutdown().await;
}
