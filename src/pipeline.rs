//! Per-book job: rectify every capture, recognize it, resolve a candidate and
//! merge it into the stored record.
//!
//! All stages run one after another on the queue's worker. Rectification and
//! recognition problems are absorbed per capture; only a missing record or a
//! failed save aborts the job.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};
use crate::extractor::{merge_into, ExtractionState, Orchestrator};
use crate::ocr::{OcrLanguages, Recognizer};
use crate::queue::{JobHandler, ProcessingQueue};
use crate::rectify::{rectify_capture, Rectifier};
use crate::schema::{
    BookRecord, ExtractedText, Provenance, RawCapture, RectifiedImage, Role, RoleTexts,
};
use crate::store::BookStore;

/// One unit of queue work: (re)process the stored captures of a book.
#[derive(Debug, Clone)]
pub struct BookJob {
    pub book_id: Uuid,
    pub languages: OcrLanguages,
}

/// Summary of a finished job, for logs and callers that process inline.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub book_id: Uuid,
    pub provenance: Provenance,
    pub fields: usize,
    pub trail: Vec<ExtractionState>,
    /// Roles whose recognition failed and contributed empty text.
    pub failed_roles: Vec<Role>,
}

pub struct BookPipeline {
    store: Arc<dyn BookStore>,
    rectifier: Arc<dyn Rectifier>,
    recognizer: Arc<dyn Recognizer>,
    orchestrator: Orchestrator,
}

impl BookPipeline {
    pub fn new(
        store: Arc<dyn BookStore>,
        rectifier: Arc<dyn Rectifier>,
        recognizer: Arc<dyn Recognizer>,
        orchestrator: Orchestrator,
    ) -> Self {
        Self {
            store,
            rectifier,
            recognizer,
            orchestrator,
        }
    }

    pub async fn process(&self, job: &BookJob) -> PipelineResult<JobReport> {
        info!(
            "Starting processing for book {} with languages {}",
            job.book_id, job.languages
        );

        let mut record = self
            .store
            .load(job.book_id)
            .await?
            .ok_or(PipelineError::NotFound(job.book_id))?;

        info!(
            "Collected captures for book {}: cover={}, info_pages={}, back={}",
            job.book_id,
            count_role(&record.captures, Role::Cover),
            count_role(&record.captures, Role::InfoPage),
            count_role(&record.captures, Role::Back)
        );

        let mut texts = Vec::with_capacity(record.captures.len());
        let mut failed_roles = Vec::new();
        for capture in &record.captures {
            let rectified = self.rectify(capture).await;
            let text = match self.recognizer.recognize(&rectified.data, &job.languages).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(
                        "{} recognition failed for {} of book {}: {}",
                        self.recognizer.name(),
                        capture.role,
                        job.book_id,
                        e
                    );
                    failed_roles.push(capture.role);
                    String::new()
                }
            };
            texts.push(ExtractedText {
                role: capture.role,
                page_index: capture.page_index,
                text,
                languages: job.languages.to_string(),
            });
        }

        let role_texts = RoleTexts::from_extracted(&texts);
        let resolution = self.orchestrator.resolve(&role_texts).await;
        merge_into(&mut record, &resolution.candidate);

        info!(
            "About to save book {} with title {:?}",
            job.book_id, record.title
        );
        self.store.save(record).await?;

        Ok(JobReport {
            book_id: job.book_id,
            provenance: resolution.candidate.provenance,
            fields: resolution.candidate.field_count(),
            trail: resolution.trail,
            failed_roles,
        })
    }

    /// Rectification is CPU-bound, so it runs on the blocking pool. The job
    /// still waits for it; nothing else runs meanwhile.
    async fn rectify(&self, capture: &RawCapture) -> RectifiedImage {
        let rectifier = self.rectifier.clone();
        let owned = capture.clone();
        match tokio::task::spawn_blocking(move || rectify_capture(rectifier.as_ref(), &owned)).await
        {
            Ok(rectified) => rectified,
            Err(e) => {
                warn!("Rectification task for {} failed: {}, using original", capture.role, e);
                RectifiedImage {
                    role: capture.role,
                    page_index: capture.page_index,
                    data: capture.data.clone(),
                }
            }
        }
    }
}

/// Store a new book and queue its first job.
///
/// A rejected submission removes the record again, so a refused upload leaves
/// nothing behind.
pub async fn enqueue_new_book(
    store: &dyn BookStore,
    queue: &ProcessingQueue<BookJob>,
    record: BookRecord,
    languages: OcrLanguages,
) -> PipelineResult<Uuid> {
    let book_id = record.id;
    store.save(record).await?;

    if let Err(e) = queue.submit(BookJob { book_id, languages }) {
        warn!("Book {} rejected by queue, discarding upload: {}", book_id, e);
        store.remove(book_id).await?;
        return Err(e);
    }
    Ok(book_id)
}

fn count_role(captures: &[RawCapture], role: Role) -> usize {
    captures.iter().filter(|c| c.role == role).count()
}

#[async_trait::async_trait]
impl JobHandler<BookJob> for BookPipeline {
    async fn handle(&self, job: BookJob) -> PipelineResult<()> {
        let report = self.process(&job).await?;
        info!(
            "Finished processing book {}: {} fields from {}, failed roles {:?}",
            report.book_id, report.fields, report.provenance, report.failed_roles
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SemanticConfig;
    use crate::pattern::PatternExtractor;
    use crate::rectify::PassthroughRectifier;
    use crate::semantic::HttpSemanticExtractor;
    use crate::store::MemoryBookStore;

    /// Treats the image bytes as the page text; bytes starting with "BAD" fail.
    struct EchoRecognizer;

    #[async_trait::async_trait]
    impl Recognizer for EchoRecognizer {
        fn name(&self) -> &str {
            "echo"
        }

        async fn recognize(&self, image: &[u8], _languages: &OcrLanguages) -> PipelineResult<String> {
            if image.starts_with(b"BAD") {
                return Err(PipelineError::Decode("not an image".to_string()));
            }
            Ok(String::from_utf8_lossy(image).into_owned())
        }
    }

    fn pipeline(store: Arc<MemoryBookStore>) -> BookPipeline {
        let semantic = HttpSemanticExtractor::new(SemanticConfig {
            enabled: false,
            ..SemanticConfig::default()
        })
        .unwrap();
        BookPipeline::new(
            store,
            Arc::new(PassthroughRectifier),
            Arc::new(EchoRecognizer),
            Orchestrator::new(Arc::new(semantic), PatternExtractor::default()),
        )
    }

    fn langs() -> OcrLanguages {
        OcrLanguages::parse(Some("rus+eng"), "rus")
    }

    fn job(book_id: Uuid) -> BookJob {
        BookJob {
            book_id,
            languages: langs(),
        }
    }

    fn sample_book() -> BookRecord {
        BookRecord::new(vec![
            RawCapture::new(Role::Cover, "ЖИЗНЬ И ПРИКЛЮЧЕНИЯ".as_bytes().to_vec()),
            RawCapture::new(Role::InfoPage, b"ISBN 978-5-4224-1415-4".to_vec()).with_page_index(2),
            RawCapture::new(
                Role::InfoPage,
                "УДК 821\nБолотов А. Т.\nМ.: Книговек, 2018".as_bytes().to_vec(),
            )
            .with_page_index(1),
            RawCapture::new(Role::Back, b"BAD bytes".to_vec()),
        ])
    }

    #[tokio::test]
    async fn test_missing_book_is_not_found() {
        let store = Arc::new(MemoryBookStore::new());
        let id = Uuid::new_v4();
        let err = pipeline(store).process(&job(id)).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(missing) if missing == id));
    }

    #[tokio::test]
    async fn test_failed_role_is_absorbed_and_record_saved() {
        let store = Arc::new(MemoryBookStore::new());
        let book = sample_book();
        let id = book.id;
        store.save(book).await.unwrap();

        let report = pipeline(store.clone()).process(&job(id)).await.unwrap();
        assert_eq!(report.provenance, Provenance::Pattern);
        assert_eq!(report.failed_roles, vec![Role::Back]);

        let saved = store.load(id).await.unwrap().unwrap();
        assert_eq!(saved.isbn.as_deref(), Some("978-5-4224-1415-4"));
        assert_eq!(saved.publisher.as_deref(), Some("Книговек"));
        assert_eq!(saved.city.as_deref(), Some("Москва"));
        assert_eq!(saved.year, Some(2018));
        assert_eq!(saved.authors, vec!["Болотов А. Т.".to_string()]);
        assert_eq!(saved.provenance, Some(Provenance::Pattern));
        assert_eq!(saved.captures.len(), 4);
    }

    /// Takes a job and never finishes it, keeping the worker busy.
    struct Stalled(tokio::sync::Semaphore);

    #[async_trait::async_trait]
    impl JobHandler<BookJob> for Stalled {
        async fn handle(&self, _job: BookJob) -> PipelineResult<()> {
            let _ = self.0.acquire().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_rejected_upload_leaves_no_record() {
        let store = Arc::new(MemoryBookStore::new());
        let queue = ProcessingQueue::start(Arc::new(Stalled(tokio::sync::Semaphore::new(0))), 1);

        // one job running, one waiting
        let running = enqueue_new_book(store.as_ref(), &queue, sample_book(), langs())
            .await
            .unwrap();
        while queue.pending() > 0 {
            tokio::task::yield_now().await;
        }
        let waiting = enqueue_new_book(store.as_ref(), &queue, sample_book(), langs())
            .await
            .unwrap();

        let rejected = sample_book();
        let rejected_id = rejected.id;
        let err = enqueue_new_book(store.as_ref(), &queue, rejected, langs())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::QueueFull { capacity: 1 }));

        assert!(store.load(rejected_id).await.unwrap().is_none());
        assert!(store.load(running).await.unwrap().is_some());
        assert!(store.load(waiting).await.unwrap().is_some());
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_upload_after_shutdown_is_discarded() {
        let store = Arc::new(MemoryBookStore::new());
        let queue = ProcessingQueue::start(Arc::new(pipeline(store.clone())), 4);
        queue.shutdown().await;

        let err = enqueue_new_book(store.as_ref(), &queue, sample_book(), langs())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::QueueClosed));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_jobs_run_through_queue() {
        let store = Arc::new(MemoryBookStore::new());
        let book = sample_book();
        let id = book.id;
        store.save(book).await.unwrap();

        let queue = ProcessingQueue::start(Arc::new(pipeline(store.clone())), 4);
        queue.submit(job(Uuid::new_v4())).unwrap();
        queue.submit(job(id)).unwrap();
        queue.shutdown().await;

        let saved = store.load(id).await.unwrap().unwrap();
        assert_eq!(saved.isbn.as_deref(), Some("978-5-4224-1415-4"));
    }
}
