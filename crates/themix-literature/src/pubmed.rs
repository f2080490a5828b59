//! PubMed E-utilities client.
//!
//! Endpoints used:
//!   esearch: https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi
//!   efetch:  https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi
//!   elink:   for PMC ID resolution (full-text excerpts)

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, instrument, warn};

use themix_common::error::{FetchKind, Result, ThemixError};
use themix_common::models::{GeneList, LiteratureRecord};
use themix_common::retry::{with_retry, RetryConfig};
use themix_common::sandbox::SandboxClient;

use crate::fill::round_robin_fill;
use crate::highlight::{highlight, matched_genes};
use crate::LiteratureSearch;

const ESEARCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi";
const EFETCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi";
const ELINK_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/elink.fcgi";

/// Gene-mentioning full-text paragraphs kept per paper.
const MAX_GENE_MENTIONS: usize = 3;

/// Tool name sent with every E-utilities request, per NCBI usage policy.
const TOOL_NAME: &str = "themix";

pub struct PubMedClient {
    client: SandboxClient,
    retry: RetryConfig,
}

impl PubMedClient {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: SandboxClient::new()?,
            retry: RetryConfig::default(),
        })
    }

    fn literature_err(kind: FetchKind, message: impl Into<String>) -> ThemixError {
        ThemixError::Literature { kind, message: message.into() }
    }

    /// Search PubMed and return a list of PMIDs, relevance-sorted.
    #[instrument(skip(self, email))]
    async fn esearch(&self, term: &str, max: usize, email: &str) -> Result<Vec<String>> {
        let resp: serde_json::Value = self
            .client
            .get(ESEARCH_URL)?
            .query(&[
                ("db", "pubmed".to_string()),
                ("term", term.to_string()),
                ("retmax", max.to_string()),
                ("sort", "relevance".to_string()),
                ("retmode", "json".to_string()),
                ("tool", TOOL_NAME.to_string()),
                ("email", email.to_string()),
            ])
            .send()
            .await
            .map_err(|e| Self::literature_err(FetchKind::from_reqwest(&e), e.to_string()))?
            .error_for_status()
            .map_err(|e| Self::literature_err(FetchKind::from_reqwest(&e), e.to_string()))?
            .json()
            .await
            .map_err(|e| Self::literature_err(FetchKind::Malformed, e.to_string()))?;

        let ids = resp["esearchresult"]["idlist"]
            .as_array()
            .unwrap_or(&vec![])
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect();

        debug!(?ids, "PubMed esearch returned PMIDs");
        Ok(ids)
    }

    /// Fetch PubMed XML for a list of PMIDs and parse into records.
    #[instrument(skip(self, email))]
    async fn efetch_abstracts(&self, pmids: &[String], email: &str) -> Result<Vec<PubMedArticle>> {
        if pmids.is_empty() {
            return Ok(vec![]);
        }

        let xml = self
            .client
            .get(EFETCH_URL)?
            .query(&[
                ("db", "pubmed".to_string()),
                ("id", pmids.join(",")),
                ("rettype", "abstract".to_string()),
                ("retmode", "xml".to_string()),
                ("tool", TOOL_NAME.to_string()),
                ("email", email.to_string()),
            ])
            .send()
            .await
            .map_err(|e| Self::literature_err(FetchKind::from_reqwest(&e), e.to_string()))?
            .error_for_status()
            .map_err(|e| Self::literature_err(FetchKind::from_reqwest(&e), e.to_string()))?
            .text()
            .await
            .map_err(|e| Self::literature_err(FetchKind::Malformed, e.to_string()))?;

        parse_pubmed_xml(&xml)
    }

    /// Resolve a PMID to its PMC id, if the paper is deposited there.
    #[instrument(skip(self, email))]
    async fn elink_pmc_id(&self, pmid: &str, email: &str) -> Result<Option<String>> {
        let resp: serde_json::Value = self
            .client
            .get(ELINK_URL)?
            .query(&[
                ("dbfrom", "pubmed".to_string()),
                ("db", "pmc".to_string()),
                ("id", pmid.to_string()),
                ("retmode", "json".to_string()),
                ("tool", TOOL_NAME.to_string()),
                ("email", email.to_string()),
            ])
            .send()
            .await
            .map_err(|e| Self::literature_err(FetchKind::from_reqwest(&e), e.to_string()))?
            .error_for_status()
            .map_err(|e| Self::literature_err(FetchKind::from_reqwest(&e), e.to_string()))?
            .json()
            .await
            .map_err(|e| Self::literature_err(FetchKind::Malformed, e.to_string()))?;

        let id = &resp["linksets"][0]["linksetdbs"][0]["links"][0];
        Ok(match id {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    /// Fetch PMC full-text XML. Returns None for papers PMC lists but will
    /// not serve (embargoed or metadata-only deposits).
    async fn fetch_pmc_fulltext(&self, pmcid: &str, email: &str) -> Result<Option<String>> {
        let xml = self
            .client
            .get(EFETCH_URL)?
            .query(&[
                ("db", "pmc".to_string()),
                ("id", pmcid.to_string()),
                ("rettype", "xml".to_string()),
                ("retmode", "xml".to_string()),
                ("tool", TOOL_NAME.to_string()),
                ("email", email.to_string()),
            ])
            .send()
            .await
            .map_err(|e| Self::literature_err(FetchKind::from_reqwest(&e), e.to_string()))?
            .error_for_status()
            .map_err(|e| Self::literature_err(FetchKind::from_reqwest(&e), e.to_string()))?
            .text()
            .await
            .map_err(|e| Self::literature_err(FetchKind::Malformed, e.to_string()))?;

        if xml.trim().is_empty() || xml.contains("<error>") {
            return Ok(None);
        }
        Ok(Some(xml))
    }

    /// Best-effort full-text enrichment: for each record, pull up to
    /// `MAX_GENE_MENTIONS` gene-mentioning paragraphs from PMC and fold any
    /// newly found genes into `matched_genes`. Failures leave the record as
    /// fetched from the abstract.
    async fn attach_gene_mentions(
        &self,
        records: &mut [LiteratureRecord],
        genes: &[String],
        email: &str,
    ) {
        for record in records.iter_mut() {
            let pmcid = match self.elink_pmc_id(&record.pmid, email).await {
                Ok(Some(id)) => id,
                Ok(None) => continue,
                Err(e) => {
                    warn!(pmid = %record.pmid, error = %e, "Skipping PMC link lookup");
                    continue;
                }
            };
            let xml = match self.fetch_pmc_fulltext(&pmcid, email).await {
                Ok(Some(xml)) => xml,
                Ok(None) => continue,
                Err(e) => {
                    warn!(pmid = %record.pmid, error = %e, "Skipping PMC full text");
                    continue;
                }
            };
            record.gene_mentions = extract_gene_paragraphs(&xml, genes, MAX_GENE_MENTIONS);
            for gene in matched_genes(&record.gene_mentions.join(" "), genes) {
                if !record.matched_genes.contains(&gene) {
                    record.matched_genes.push(gene);
                }
            }
        }
    }

    /// Run one query end to end, turning articles into records tagged with
    /// the query context.
    async fn query(
        &self,
        term: &str,
        max: usize,
        email: &str,
        context: &str,
        query_genes: &[String],
    ) -> Result<Vec<LiteratureRecord>> {
        let pmids = with_retry(&self.retry, || self.esearch(term, max, email)).await?;
        let articles = with_retry(&self.retry, || self.efetch_abstracts(&pmids, email)).await?;
        Ok(articles
            .into_iter()
            .map(|a| a.into_record(context, query_genes))
            .collect())
    }
}

#[async_trait]
impl LiteratureSearch for PubMedClient {
    #[instrument(skip(self, genes, email), fields(n_genes = genes.len()))]
    async fn search(
        &self,
        genes: &GeneList,
        email: &str,
        search_terms: &[String],
        papers_per_gene: usize,
        max_papers: usize,
    ) -> Result<Vec<LiteratureRecord>> {
        if email.trim().is_empty() {
            return Err(ThemixError::Config(
                "a contact email is required for PubMed queries".to_string(),
            ));
        }

        let mut per_gene = Vec::with_capacity(genes.len());
        for gene in genes.symbols() {
            let term = build_query(std::slice::from_ref(gene), search_terms);
            match self
                .query(&term, papers_per_gene, email, gene, genes.symbols())
                .await
            {
                Ok(records) => per_gene.push(records),
                Err(e) => {
                    // One failing gene query does not abort the search.
                    warn!(gene = %gene, error = %e, "Skipping gene literature query");
                    per_gene.push(vec![]);
                }
            }
        }

        let broad_term = build_query(genes.symbols(), search_terms);
        let broad = match self
            .query(&broad_term, max_papers, email, "combined", genes.symbols())
            .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Skipping broad literature query");
                vec![]
            }
        };

        let mut records = round_robin_fill(per_gene, broad, max_papers);
        self.attach_gene_mentions(&mut records, genes.symbols(), email)
            .await;
        Ok(records)
    }
}

/// Pull paragraphs out of PMC article XML and keep the first `max` that
/// mention a query gene, highlighted and whitespace-collapsed.
fn extract_gene_paragraphs(xml: &str, genes: &[String], max: usize) -> Vec<String> {
    let mut mentions = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut depth = 0usize;
    let mut paragraph = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"p" => {
                depth += 1;
                if depth == 1 {
                    paragraph.clear();
                }
            }
            Ok(Event::Text(ref e)) if depth > 0 => {
                if !paragraph.is_empty() {
                    paragraph.push(' ');
                }
                paragraph.push_str(&e.unescape().unwrap_or_default());
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"p" => {
                depth = depth.saturating_sub(1);
                if depth == 0 && !matched_genes(&paragraph, genes).is_empty() {
                    let clean = paragraph.split_whitespace().collect::<Vec<_>>().join(" ");
                    mentions.push(highlight(&clean, genes));
                    if mentions.len() == max {
                        break;
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    mentions
}

/// PubMed term syntax: text-word gene clause, optional MeSH filter, and a
/// publication-date floor of 2015.
fn build_query(genes: &[String], search_terms: &[String]) -> String {
    let gene_clause = format!("({}[tw])", genes.join("[tw] OR "));
    let mesh_clause = if search_terms.is_empty() {
        String::new()
    } else {
        format!("AND ({}[MeSH Terms]) ", search_terms.join("[MeSH Terms] OR "))
    };
    format!("{gene_clause} {mesh_clause}AND 2015:3000[PDAT]")
}

/// Intermediate parse product of one `<PubmedArticle>`.
#[derive(Debug, Default)]
struct PubMedArticle {
    pmid: String,
    title: String,
    abstract_text: String,
    year: Option<String>,
}

impl PubMedArticle {
    fn into_record(self, context: &str, query_genes: &[String]) -> LiteratureRecord {
        let mentions_text = format!("{} {}", self.title, self.abstract_text);
        let snippet = if self.abstract_text.is_empty() {
            None
        } else {
            Some(highlight(&self.abstract_text, query_genes))
        };
        LiteratureRecord {
            pmid: self.pmid,
            title: self.title,
            context: context.to_string(),
            year: self.year,
            abstract_snippet: snippet,
            matched_genes: matched_genes(&mentions_text, query_genes),
            gene_mentions: Vec::new(),
        }
    }
}

/// Parse PubMed XML (efetch abstract mode) into article records.
/// Handles the <PubmedArticleSet><PubmedArticle> structure.
fn parse_pubmed_xml(xml: &str) -> Result<Vec<PubMedArticle>> {
    let mut articles = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    // State machine for XML parsing
    let mut current: Option<PubMedArticle> = None;
    let mut in_pmid = false;
    let mut in_title = false;
    let mut in_abstract = false;
    let mut in_pub_date = false;
    let mut in_year = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"PubmedArticle" => current = Some(PubMedArticle::default()),
                b"PMID" => in_pmid = true,
                b"ArticleTitle" => in_title = true,
                b"AbstractText" => in_abstract = true,
                b"PubDate" => in_pub_date = true,
                b"Year" => in_year = true,
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().unwrap_or_default().to_string();
                if let Some(ref mut a) = current {
                    if in_pmid && a.pmid.is_empty() {
                        a.pmid = text.clone();
                    }
                    if in_title {
                        a.title.push_str(&text);
                    }
                    if in_abstract {
                        if !a.abstract_text.is_empty() {
                            a.abstract_text.push(' ');
                        }
                        a.abstract_text.push_str(&text);
                    }
                    if in_pub_date && in_year && a.year.is_none() {
                        a.year = Some(text.clone());
                    }
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"PMID" => in_pmid = false,
                b"ArticleTitle" => in_title = false,
                b"AbstractText" => in_abstract = false,
                b"PubDate" => in_pub_date = false,
                b"Year" => in_year = false,
                b"PubmedArticle" => {
                    if let Some(a) = current.take() {
                        if !a.title.is_empty() && !a.pmid.is_empty() {
                            articles.push(a);
                        } else {
                            warn!("Skipping article with empty title or PMID");
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ThemixError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(articles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_pubmed_xml() {
        let xml = r#"<?xml version="1.0"?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation>
      <PMID>12345678</PMID>
      <Article>
        <ArticleTitle>TOP2A overexpression in proliferating tumours</ArticleTitle>
        <Abstract><AbstractText>Top2a marks cycling cells.</AbstractText></Abstract>
        <Journal>
          <JournalIssue><PubDate><Year>2021</Year></PubDate></JournalIssue>
        </Journal>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

        let articles = parse_pubmed_xml(xml).unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].pmid, "12345678");
        assert_eq!(articles[0].title, "TOP2A overexpression in proliferating tumours");
        assert_eq!(articles[0].year.as_deref(), Some("2021"));
    }

    #[test]
    fn test_parse_skips_articles_without_title() {
        let xml = r#"<PubmedArticleSet>
  <PubmedArticle><MedlineCitation><PMID>1</PMID></MedlineCitation></PubmedArticle>
</PubmedArticleSet>"#;
        assert!(parse_pubmed_xml(xml).unwrap().is_empty());
    }

    #[test]
    fn test_record_conversion_matches_and_highlights() {
        let article = PubMedArticle {
            pmid: "42".to_string(),
            title: "CCNB1 in mitosis".to_string(),
            abstract_text: "Ccnb1 peaks at G2/M.".to_string(),
            year: Some("2020".to_string()),
        };
        let genes = vec!["CCNB1".to_string(), "TOP2A".to_string()];
        let record = article.into_record("CCNB1", &genes);
        assert_eq!(record.matched_genes, vec!["CCNB1".to_string()]);
        assert_eq!(record.abstract_snippet.as_deref(), Some("**Ccnb1** peaks at G2/M."));
    }

    #[test]
    fn test_extract_gene_paragraphs_keeps_mentioning_paragraphs() {
        let xml = r#"<pmc-articleset><article><body>
            <sec><p>Methods were as described previously.</p></sec>
            <sec><p>We observed that <italic>Top2a</italic> knockdown
                arrested cells in G2.</p></sec>
            <sec><p>CCNB1 levels peaked before mitotic entry.</p></sec>
        </body></article></pmc-articleset>"#;
        let genes = vec!["TOP2A".to_string(), "CCNB1".to_string()];

        let mentions = extract_gene_paragraphs(xml, &genes, 3);
        assert_eq!(mentions.len(), 2);
        assert!(mentions[0].contains("**Top2a** knockdown arrested"));
        assert!(mentions[1].contains("**CCNB1** levels"));
    }

    #[test]
    fn test_extract_gene_paragraphs_caps_at_max() {
        let xml = r#"<body>
            <p>TOP2A one.</p><p>TOP2A two.</p><p>TOP2A three.</p><p>TOP2A four.</p>
        </body>"#;
        let genes = vec!["TOP2A".to_string()];
        assert_eq!(extract_gene_paragraphs(xml, &genes, 3).len(), 3);
    }

    #[test]
    fn test_extract_gene_paragraphs_no_match_is_empty() {
        let xml = "<body><p>No relevant symbols here.</p></body>";
        assert!(extract_gene_paragraphs(xml, &["TOP2A".to_string()], 3).is_empty());
    }

    #[test]
    fn test_build_query_shapes() {
        let genes = vec!["TOP2A".to_string(), "CCNB1".to_string()];
        assert_eq!(
            build_query(&genes, &[]),
            "(TOP2A[tw] OR CCNB1[tw]) AND 2015:3000[PDAT]"
        );
        let terms = vec!["neoplasms".to_string(), "immunity".to_string()];
        assert_eq!(
            build_query(&genes[..1], &terms),
            "(TOP2A[tw]) AND (neoplasms[MeSH Terms] OR immunity[MeSH Terms]) AND 2015:3000[PDAT]"
        );
    }
}
