use crate::{
    error::SelectError,
    selector::{Selected, SelectionStream},
};
use futures::StreamExt;
use model::records::{
    batch::{Batch, SelectedDoc},
    outcome::Rejection,
};

/// Slices `items` into consecutive batches of `batch_size`; the last one
/// may be smaller. `batch_size` must be non-zero.
pub fn partition(items: Vec<SelectedDoc>, batch_size: usize) -> Vec<Batch> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::with_capacity(items.len().div_ceil(batch_size));
    let mut items = items.into_iter().peekable();
    while items.peek().is_some() {
        let chunk: Vec<SelectedDoc> = items.by_ref().take(batch_size).collect();
        batches.push(Batch::new(batches.len(), chunk));
    }
    batches
}

/// Pulls batches off a selection stream as they fill up, setting
/// rejected entries aside.
pub struct Batcher {
    stream: SelectionStream,
    batch_size: usize,
    next_index: usize,
    rejections: Vec<Rejection>,
    selected: u64,
    exhausted: bool,
    pending_error: Option<SelectError>,
}

impl Batcher {
    pub fn new(stream: SelectionStream, batch_size: usize) -> Self {
        Self {
            stream,
            batch_size: batch_size.max(1),
            next_index: 0,
            rejections: Vec::new(),
            selected: 0,
            exhausted: false,
            pending_error: None,
        }
    }

    /// Next full (or final partial) batch, `None` once the selection is drained.
    ///
    /// A stream failure first flushes the documents gathered before it, then
    /// surfaces on the following call.
    pub async fn next_batch(&mut self) -> Result<Option<Batch>, SelectError> {
        if let Some(err) = self.pending_error.take() {
            return Err(err);
        }
        if self.exhausted {
            return Ok(None);
        }

        let mut items = Vec::with_capacity(self.batch_size);
        while items.len() < self.batch_size {
            match self.stream.next().await {
                Some(Ok(Selected::Doc(doc))) => items.push(doc),
                Some(Ok(Selected::Rejected(rejection))) => self.rejections.push(rejection),
                Some(Err(err)) => {
                    self.exhausted = true;
                    if items.is_empty() {
                        return Err(err);
                    }
                    self.pending_error = Some(err);
                    break;
                }
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }

        if items.is_empty() {
            return Ok(None);
        }

        self.selected += items.len() as u64;
        let batch = Batch::new(self.next_index, items);
        self.next_index += 1;
        Ok(Some(batch))
    }

    /// Documents handed out in batches so far.
    pub fn selected(&self) -> u64 {
        self.selected
    }

    pub fn take_rejections(&mut self) -> Vec<Rejection> {
        std::mem::take(&mut self.rejections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use model::core::identifiers::DocId;

    fn docs(n: i64) -> Vec<SelectedDoc> {
        (0..n).map(|i| SelectedDoc::id(DocId::Int(i))).collect()
    }

    #[test]
    fn test_partition_ten_by_three() {
        let batches = partition(docs(10), 3);
        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![3, 3, 3, 1]);
        assert_eq!(batches[3].id, "batch-3");
        assert_eq!(batches[3].items[0].id, DocId::Int(9));
    }

    #[test]
    fn test_partition_sizes() {
        for (n, b) in [(0, 4), (1, 1), (7, 7), (8, 7), (100, 9)] {
            let batches = partition(docs(n), b);
            assert_eq!(batches.len(), (n as usize).div_ceil(b));
            assert_eq!(batches.iter().map(Batch::len).sum::<usize>(), n as usize);
        }
    }

    #[tokio::test]
    async fn test_streaming_batcher_sets_rejections_aside() {
        let mut entries: Vec<Result<Selected, SelectError>> =
            docs(5).into_iter().map(|d| Ok(Selected::Doc(d))).collect();
        entries.insert(
            2,
            Ok(Selected::Rejected(Rejection {
                line: Some(3),
                value: "x".into(),
                reason: "bad".into(),
            })),
        );
        let mut batcher = Batcher::new(stream::iter(entries).boxed(), 2);

        let mut sizes = Vec::new();
        while let Some(batch) = batcher.next_batch().await.unwrap() {
            assert_eq!(batch.index, sizes.len());
            sizes.push(batch.len());
        }
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(batcher.selected(), 5);
        assert_eq!(batcher.take_rejections().len(), 1);
    }

    #[tokio::test]
    async fn test_stream_error_stops_batching() {
        let entries: Vec<Result<Selected, SelectError>> = vec![
            Ok(Selected::Doc(SelectedDoc::id(DocId::Int(1)))),
            Err(SelectError::Store(connectors::error::StoreError::Transient(
                "cursor killed".into(),
            ))),
        ];
        let mut batcher = Batcher::new(stream::iter(entries).boxed(), 10);
        assert_eq!(batcher.next_batch().await.unwrap().map(|b| b.len()), Some(1));
        assert!(batcher.next_batch().await.is_err());
        assert!(batcher.next_batch().await.unwrap().is_none());
    }
}
