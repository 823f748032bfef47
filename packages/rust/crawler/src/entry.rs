//! Entry-point resolution for a company's career site.

use careerscout_shared::text;
use careerscout_sources::discover_careers_urls;
use tracing::{debug, warn};
use url::Url;

use crate::ats::{self, AtsBoard, AtsKind};
use crate::engine::{CareerCrawler, EntryPage, Session};

impl CareerCrawler {
    /// Probe ATS boards by company slug, then a Workday careers page, then
    /// web search. Board postings are recorded directly; the returned pages
    /// seed the BFS and are empty when a board already yielded postings.
    pub(crate) async fn resolve_entry(&self, session: &mut Session<'_>) -> Vec<EntryPage> {
        let slug = text::company_slug(session.company);
        if slug.is_empty() {
            warn!(company = %session.company, "company name has no usable slug");
            return Vec::new();
        }

        let mut board_postings = 0;
        for kind in [AtsKind::Greenhouse, AtsKind::Lever] {
            let board = AtsBoard {
                kind,
                slug: slug.clone(),
            };
            board_postings += self.crawl_board(session, board).await;
        }
        if board_postings > 0 {
            return Vec::new();
        }

        if let Ok(workday) = Url::parse(&self.endpoints.workday_url(&slug)) {
            if let Some(body) = self.fetch(session, &workday).await {
                debug!(url = %workday, "workday careers page resolved");
                return vec![EntryPage {
                    url: workday,
                    body: Some(body),
                }];
            }
        }

        let Some(search) = &self.search else {
            debug!("web search not configured, no further entry points");
            return Vec::new();
        };

        let urls = match discover_careers_urls(
            search.as_ref(),
            session.company,
            session.keywords,
            self.config.max_entry_urls,
        )
        .await
        {
            Ok(urls) => urls,
            Err(e) => {
                session
                    .result
                    .errors
                    .push((format!("search:{}", session.company), e.to_string()));
                return Vec::new();
            }
        };

        let mut pages = Vec::new();
        for url in urls {
            match ats::detect_board(&url) {
                Some(board) => {
                    self.crawl_board(session, board).await;
                }
                None => pages.push(EntryPage { url, body: None }),
            }
        }
        pages
    }
}
