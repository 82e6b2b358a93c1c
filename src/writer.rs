//! Bulk document writes.

use std::ops::Range;

use tracing::debug;

use crate::config::{BatchLimits, BatchPolicy};
use crate::error::{IngestionError, IngestionResult};
use crate::outcome::Outcome;
use crate::store::{DatabaseName, Session, StoreRequest, Transport};
use crate::types::Document;

/// Split `documents` into consecutive ranges of at most `limits.max_cells` cells each.
///
/// With [`BatchPolicy::Reject`] the whole batch must fit in one range. Either way a single
/// document larger than the limit is [`IngestionError::BatchTooLarge`].
pub fn plan_batches(documents: &[Document], limits: &BatchLimits) -> IngestionResult<Vec<Range<usize>>> {
    if documents.is_empty() {
        return Ok(Vec::new());
    }

    let total: usize = documents.iter().map(Document::cell_count).sum();
    let too_large = |documents: usize, cells: usize| IngestionError::BatchTooLarge {
        documents,
        cells,
        limit: limits.max_cells,
    };

    if total <= limits.max_cells {
        return Ok(vec![0..documents.len()]);
    }
    if limits.policy == BatchPolicy::Reject {
        return Err(too_large(documents.len(), total));
    }

    let mut ranges = Vec::new();
    let mut start = 0usize;
    let mut cells = 0usize;
    for (i, doc) in documents.iter().enumerate() {
        let n = doc.cell_count();
        if n > limits.max_cells {
            return Err(too_large(1, n));
        }
        if cells + n > limits.max_cells {
            ranges.push(start..i);
            start = i;
            cells = 0;
        }
        cells += n;
    }
    ranges.push(start..documents.len());
    Ok(ranges)
}

/// Write `documents` to `database` and classify the aggregate outcome.
///
/// An empty batch is [`Outcome::Ok`] without contacting the store. Batches are planned with
/// [`plan_batches`] before the first request; chunks are then written in order, stopping at the
/// first fatal outcome. The result is the worst chunk outcome.
pub fn write_documents<T: Transport>(
    session: &mut Session<T>,
    database: &DatabaseName,
    documents: &[Document],
    limits: &BatchLimits,
) -> IngestionResult<Outcome> {
    let ranges = plan_batches(documents, limits)?;

    let mut aggregate = Outcome::Ok;
    let chunk_count = ranges.len();
    for (n, range) in ranges.into_iter().enumerate() {
        debug!(chunk = n + 1, chunks = chunk_count, documents = range.len(), "bulk write");
        let request = StoreRequest::BulkDocs {
            database: database.clone(),
            docs: documents[range].to_vec(),
        };
        aggregate = aggregate.worst(session.submit(&request));
        if aggregate.is_fatal() {
            break;
        }
    }
    Ok(aggregate)
}
