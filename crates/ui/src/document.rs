//! The append-only document shared by the conversation loop and renderers.
//!
//! Writers add blocks and mutate them in place; subscribers are told about
//! every append and every mutation. The block list is copy-on-write so readers
//! only hold the lock long enough to clone an `Arc`.

use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::block::Block;

/// Receives a callback for every change to a document.
///
/// Called synchronously on the thread that made the change, outside the
/// document lock. Implementations must not block for long.
pub trait Subscriber: Send + Sync {
    fn document_changed(&self, doc: &Document, block: &Block);
}

struct SubscriptionEntry {
    id: u64,
    subscriber: Mutex<Option<Arc<dyn Subscriber>>>,
}

impl SubscriptionEntry {
    fn live(&self) -> Option<Arc<dyn Subscriber>> {
        self.subscriber
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn clear(&self) {
        *self.subscriber.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

#[derive(Default)]
struct DocumentState {
    blocks: Arc<Vec<Block>>,
    subscriptions: Vec<Arc<SubscriptionEntry>>,
    next_id: u64,
}

#[derive(Default)]
pub(crate) struct DocumentInner {
    state: Mutex<DocumentState>,
}

impl std::fmt::Debug for DocumentInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentInner").finish_non_exhaustive()
    }
}

/// Handle to a shared document. Clones refer to the same document.
#[derive(Clone, Default)]
pub struct Document {
    inner: Arc<DocumentInner>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("num_blocks", &self.num_blocks())
            .finish()
    }
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_inner(inner: Arc<DocumentInner>) -> Self {
        Self { inner }
    }

    /// Append a block and notify subscribers.
    ///
    /// A block already attached to a document is ignored.
    pub fn add_block(&self, block: impl Into<Block>) {
        let block = block.into();
        {
            let mut state = self.lock();
            if !block.attach(&self.inner) {
                warn!("Block is already attached to a document; ignoring add_block");
                return;
            }
            let mut blocks = Vec::with_capacity(state.blocks.len() + 1);
            blocks.extend(state.blocks.iter().cloned());
            blocks.push(block.clone());
            state.blocks = Arc::new(blocks);
        }
        self.send_document_changed(&block);
    }

    /// Notify subscribers that an attached block's content changed.
    pub(crate) fn block_changed(&self, block: &Block) {
        self.send_document_changed(block);
    }

    /// Register a subscriber. Dropping or closing the handle detaches it.
    pub fn add_subscription(&self, subscriber: Arc<dyn Subscriber>) -> Subscription {
        let mut state = self.lock();
        state.next_id += 1;
        let entry = Arc::new(SubscriptionEntry {
            id: state.next_id,
            subscriber: Mutex::new(Some(subscriber)),
        });

        state.subscriptions.retain(|s| s.live().is_some());
        state.subscriptions.push(entry.clone());
        Subscription { entry }
    }

    /// Snapshot of the blocks in presentation order.
    pub fn blocks(&self) -> Arc<Vec<Block>> {
        self.lock().blocks.clone()
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks().len()
    }

    /// Position of `block` in the document, by reference.
    pub fn index_of(&self, block: &Block) -> Option<usize> {
        self.blocks().iter().position(|b| b.ptr_eq(block))
    }

    /// Number of registered subscriptions, closed ones included until pruned.
    pub fn num_subscriptions(&self) -> usize {
        self.lock().subscriptions.len()
    }

    fn send_document_changed(&self, block: &Block) {
        let subscriptions = self.lock().subscriptions.clone();
        for entry in subscriptions {
            if let Some(subscriber) = entry.live() {
                subscriber.document_changed(self, block);
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DocumentState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A registered subscriber. Closing is idempotent.
pub struct Subscription {
    entry: Arc<SubscriptionEntry>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.entry.id
    }

    pub fn close(&self) {
        self.entry.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.entry.live().is_none()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.entry.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{ErrorBlock, TextBlock};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSubscriber {
        count: AtomicUsize,
    }

    impl Subscriber for CountingSubscriber {
        fn document_changed(&self, _doc: &Document, _block: &Block) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Records the text of the block on each notification.
    #[derive(Default)]
    struct RecordingSubscriber {
        seen: Mutex<Vec<String>>,
    }

    impl Subscriber for RecordingSubscriber {
        fn document_changed(&self, _doc: &Document, block: &Block) {
            self.seen.lock().unwrap().push(block.text());
        }
    }

    #[test]
    fn add_block_grows_document() {
        let doc = Document::new();
        let mut last = None;
        for i in 0..5 {
            let block = TextBlock::with_text(format!("block {i}"));
            doc.add_block(block.clone());
            last = Some(Block::from(block));
        }
        assert_eq!(doc.num_blocks(), 5);
        assert_eq!(doc.index_of(&last.unwrap()), Some(4));
    }

    #[test]
    fn index_of_unknown_block_is_none() {
        let doc = Document::new();
        doc.add_block(TextBlock::with_text("a"));
        assert_eq!(doc.index_of(&Block::from(TextBlock::new())), None);
    }

    #[test]
    fn snapshot_is_not_affected_by_later_appends() {
        let doc = Document::new();
        doc.add_block(TextBlock::with_text("a"));
        let snapshot = doc.blocks();
        doc.add_block(TextBlock::with_text("b"));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(doc.num_blocks(), 2);
    }

    #[test]
    fn add_block_notifies_once_per_call() {
        let doc = Document::new();
        let sub = Arc::new(CountingSubscriber::default());
        let _handle = doc.add_subscription(sub.clone());

        doc.add_block(TextBlock::with_text("a"));
        doc.add_block(ErrorBlock::new("b"));
        assert_eq!(sub.count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn block_mutation_notifies_with_new_content() {
        let doc = Document::new();
        let sub = Arc::new(RecordingSubscriber::default());
        let _handle = doc.add_subscription(sub.clone());

        let block = TextBlock::new();
        doc.add_block(block.clone());
        block.append_text("hel");
        block.append_text("lo");

        let seen = sub.seen.lock().unwrap().clone();
        assert_eq!(seen, vec!["", "hel", "hello"]);
    }

    #[test]
    fn re_adding_an_attached_block_is_ignored() {
        let doc = Document::new();
        let other = Document::new();
        let block = TextBlock::with_text("once");
        doc.add_block(block.clone());
        other.add_block(block.clone());
        doc.add_block(block.clone());

        assert_eq!(doc.num_blocks(), 1);
        assert_eq!(other.num_blocks(), 0);
        assert_eq!(Block::from(block).document().map(|d| d.num_blocks()), Some(1));
    }

    #[test]
    fn closed_subscription_is_skipped() {
        let doc = Document::new();
        let sub = Arc::new(CountingSubscriber::default());
        let handle = doc.add_subscription(sub.clone());

        doc.add_block(TextBlock::with_text("a"));
        handle.close();
        handle.close();
        doc.add_block(TextBlock::with_text("b"));

        assert!(handle.is_closed());
        assert_eq!(sub.count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_subscription_is_pruned_on_next_registration() {
        let doc = Document::new();
        let first = doc.add_subscription(Arc::new(CountingSubscriber::default()));
        let second = doc.add_subscription(Arc::new(CountingSubscriber::default()));
        assert_eq!(doc.num_subscriptions(), 2);
        assert!(second.id() > first.id());

        drop(first);
        let _third = doc.add_subscription(Arc::new(CountingSubscriber::default()));
        assert_eq!(doc.num_subscriptions(), 2);
    }

    #[test]
    fn concurrent_appends_with_churning_subscribers() {
        const APPENDS: usize = 200;

        let doc = Document::new();
        let steady = Arc::new(CountingSubscriber::default());
        let _steady_handle = doc.add_subscription(steady.clone());

        let churn = {
            let doc = doc.clone();
            std::thread::spawn(move || {
                for _ in 0..APPENDS {
                    let handle = doc.add_subscription(Arc::new(CountingSubscriber::default()));
                    handle.close();
                }
            })
        };

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let doc = doc.clone();
                std::thread::spawn(move || {
                    for i in 0..APPENDS / 4 {
                        doc.add_block(TextBlock::with_text(format!("{w}-{i}")));
                    }
                })
            })
            .collect();

        for writer in writers {
            writer.join().unwrap();
        }
        churn.join().unwrap();

        assert_eq!(doc.num_blocks(), APPENDS);
        assert_eq!(steady.count.load(Ordering::SeqCst), APPENDS);
    }
}
