//! End-to-end scenarios for the research pipeline.

#[cfg(test)]
mod tests {
    use crate::core::{keys, RunState};
    use crate::events::{steps, CollectingAuditSink, JsonlAuditSink};
    use crate::pipeline::{PipelineStep, ResearchPipeline};
    use crate::providers::{DocumentExporter, LocalDocsSearch};
    use crate::resilience::CircuitBreaker;
    use crate::testing::{
        generator_over, sample_hits, valid_report_json, FailingExporter, PanickingStage,
        RecordingExporter, StubSearch, StubTransport,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    const QUERY: &str = "electric vehicle adoption 2024";
    const ARTICLE: &str = "Electric vehicles went mainstream in 2024. Prices fell and charging spread.";

    struct Harness {
        pipeline: ResearchPipeline,
        search: Arc<StubSearch>,
        transport: Arc<StubTransport>,
        audit: Arc<CollectingAuditSink>,
    }

    fn search_with_pages(n: usize) -> StubSearch {
        (0..n).fold(StubSearch::new(sample_hits(n)), |search, i| {
            search.with_page(
                format!("https://source{i}.example/article"),
                format!("Full text of article {i}."),
            )
        })
    }

    fn harness_with(
        search: StubSearch,
        transport: StubTransport,
        exporter: Arc<dyn DocumentExporter>,
        breaker: Option<Arc<CircuitBreaker>>,
    ) -> Harness {
        let search = Arc::new(search);
        let (generator, transport) = generator_over(transport);
        let audit = Arc::new(CollectingAuditSink::new());

        let mut builder = ResearchPipeline::builder()
            .search(search.clone())
            .generator(generator)
            .exporter(exporter)
            .audit(audit.clone());
        if let Some(breaker) = breaker {
            builder = builder.breaker(breaker);
        }

        Harness {
            pipeline: builder.build().unwrap(),
            search,
            transport,
            audit,
        }
    }

    fn harness(report_json: String) -> Harness {
        harness_with(
            search_with_pages(2),
            StubTransport::scripted(vec![Ok(report_json)], ARTICLE),
            Arc::new(RecordingExporter::new()),
            None,
        )
    }

    #[tokio::test]
    async fn test_happy_path_produces_report_and_article() {
        let h = harness(valid_report_json("EV Adoption 2024"));
        let state = h.pipeline.run(QUERY).await;

        assert_eq!(state.report().unwrap().title, "EV Adoption 2024");
        assert!(state.schema_ok());
        assert!(state.violations().is_empty());
        assert!(!state.policy_violation());
        assert_eq!(state.article(), Some(ARTICLE));
        assert_eq!(
            state.export_handle().unwrap().location,
            "memory://report_electric_vehicle_ado.md"
        );
        assert_eq!(
            state.tools_used(),
            [
                "web_search",
                "full_page_fetch",
                "analyst_web_parser",
                "groq_writer",
                "schema_validation",
                "document_export",
                "narrative_writer",
            ]
        );
        assert_eq!(state.facts().unwrap().len(), 2);
        assert_eq!(h.transport.calls(), 2);

        assert_eq!(
            h.audit.steps(),
            vec![
                steps::RESEARCHER_WEB_SEARCH,
                steps::ANALYST_FACTS_EXTRACTED,
                steps::WRITER_SUCCESS,
                steps::REVIEWER_SCHEMA_OK,
                steps::REVIEWER_PDF_GENERATED,
                steps::NARRATIVE_WRITER_SUCCESS,
                steps::GRAPH_RUN_COMPLETE,
            ]
        );
        let complete = &h.audit.events_for(steps::GRAPH_RUN_COMPLETE)[0];
        assert_eq!(complete["query"], QUERY);
        assert_eq!(
            complete["result_keys"],
            json!(["article", "facts", "pdf_report", "report", "report_raw"])
        );

        let summaries = h.audit.summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].query, QUERY);
        assert_eq!(summaries[0].tools_used.len(), 7);
    }

    #[tokio::test]
    async fn test_local_documents_feed_the_whole_run() {
        let search = LocalDocsSearch::from_documents([
            ("ev.md", "Electric vehicle adoption doubled in 2024 as prices fell."),
            ("grid.txt", "Grid operators added vehicle charging capacity."),
            ("misc.md", "Unrelated notes."),
        ]);
        let (generator, transport) =
            generator_over(StubTransport::scripted(vec![Ok(valid_report_json("EV"))], ARTICLE));
        let pipeline = ResearchPipeline::builder()
            .search(Arc::new(search))
            .generator(generator)
            .exporter(Arc::new(RecordingExporter::new()))
            .build()
            .unwrap();

        let state = pipeline.run(QUERY).await;

        assert_eq!(state.docs.len(), 2);
        assert_eq!(state.docs[0].title, "ev.md");
        assert!(state.docs.iter().all(|d| d.full_text.is_none()));
        let facts = state.facts().unwrap();
        assert!(facts.iter().all(|f| f.url.is_none()));
        assert!(facts[0].content.contains("adoption doubled"));
        assert!(state.schema_ok());
        assert!(state.violations().is_empty());
        assert_eq!(state.article(), Some(ARTICLE));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_prose_output_is_a_parse_failure() {
        let h = harness_with(
            search_with_pages(2),
            StubTransport::new("I'm sorry, I can't write that report right now."),
            Arc::new(RecordingExporter::new()),
            None,
        );
        let state = h.pipeline.run(QUERY).await;

        assert!(state.has_violation("writer_json_parse_failure"));
        assert_eq!(state.failure_count(), 1);
        assert!(state.tool_error());
        assert!(!state.has_output(keys::REPORT_RAW));
        assert!(!state.has_output(keys::REPORT));
        assert_eq!(
            state.violations(),
            ["writer_json_parse_failure", "no_report", "no_structured_report"]
        );
        // Narrate has nothing to work from
        assert_eq!(h.transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_spent_failure_budget_routes_to_partial_summary() {
        let h = harness(valid_report_json("EV Adoption 2024"));
        let state = h
            .pipeline
            .run_state(RunState::new(QUERY).with_failure_count(3))
            .await;

        let partial = state.partial_report().unwrap();
        assert_eq!(partial.title, format!("Partial results for: {QUERY}"));
        assert_eq!(partial.facts.len(), 2);
        assert!(!state.has_output(keys::REPORT));
        assert!(!state.has_output(keys::ARTICLE));
        assert!(!state.schema_ok());
        assert_eq!(
            h.audit.events_for(steps::GRAPH_PARTIAL_SUMMARY),
            vec![json!({"failure_count": 3})]
        );
    }

    #[tokio::test]
    async fn test_repeat_run_is_served_from_cache() {
        let h = harness(valid_report_json("EV Adoption 2024"));

        let first = h.pipeline.run(QUERY).await;
        assert_eq!(h.transport.calls(), 2);

        let second = h.pipeline.run(QUERY).await;
        assert_eq!(h.transport.calls(), 2);
        assert_eq!(first.report(), second.report());
        assert_eq!(first.article(), second.article());
    }

    #[tokio::test]
    async fn test_single_fetch_failure_is_isolated() {
        let search = StubSearch::new(sample_hits(3))
            .with_page("https://source0.example/article", "Page zero.")
            .with_page("https://source2.example/article", "Page two.");
        let h = harness_with(
            search,
            StubTransport::scripted(vec![Ok(valid_report_json("EV"))], ARTICLE),
            Arc::new(RecordingExporter::new()),
            None,
        );
        let state = h.pipeline.run(QUERY).await;

        assert_eq!(state.docs.len(), 3);
        assert!(state.docs.iter().all(|d| !d.combined_content().is_empty()));
        assert_eq!(state.docs[1].full_text, None);
        assert!(state.violations().is_empty());
        assert_eq!(h.search.fetched().len(), 3);
    }

    #[tokio::test]
    async fn test_moderation_flag_does_not_block_the_run() {
        let mut candidate: serde_json::Value =
            serde_json::from_str(&valid_report_json("EV Supply Risks")).unwrap();
        candidate["summary"] = json!("Analysts warn that terror attacks on ports could slow deliveries.");
        let h = harness(candidate.to_string());
        let state = h.pipeline.run(QUERY).await;

        assert!(state.policy_violation());
        assert!(state.has_violation("policy_violation:policy matched pattern: "));
        assert!(state.report().is_some());
        assert!(state.article().is_some());
        assert_eq!(state.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_report_exists_iff_schema_ok() {
        let mut invalid: serde_json::Value = serde_json::from_str(&valid_report_json("EV")).unwrap();
        invalid["key_findings"] = json!("one long string");
        invalid["generated_at"] = json!("yesterday");

        for (candidate, expect_ok) in [(valid_report_json("EV"), true), (invalid.to_string(), false)] {
            let state = harness(candidate).pipeline.run(QUERY).await;
            assert_eq!(state.schema_ok(), expect_ok);
            assert_eq!(state.has_output(keys::REPORT), state.schema_ok());
            assert_eq!(state.has_violation("schema_error: "), !expect_ok);
        }
    }

    #[tokio::test]
    async fn test_schema_error_makes_narrate_a_noop() {
        let mut invalid: serde_json::Value = serde_json::from_str(&valid_report_json("EV")).unwrap();
        invalid.as_object_mut().unwrap().remove("title");
        let h = harness(invalid.to_string());
        let state = h.pipeline.run(QUERY).await;

        assert!(state.has_violation("schema_error: 1 validation error(s) for Report"));
        assert!(state.has_violation("no_structured_report"));
        assert!(state.article().is_none());
        assert_eq!(state.failure_count(), 0);
        assert_eq!(h.transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_export_failure_keeps_the_report() {
        let h = harness_with(
            search_with_pages(2),
            StubTransport::scripted(vec![Ok(valid_report_json("EV"))], ARTICLE),
            Arc::new(FailingExporter),
            None,
        );
        let state = h.pipeline.run(QUERY).await;

        assert!(state.schema_ok());
        assert!(state.report().is_some());
        assert!(state.article().is_some());
        assert!(state.has_violation("export_failed: "));
        assert!(state.export_handle().is_none());
    }

    #[tokio::test]
    async fn test_open_breaker_skips_every_stage() {
        let breaker = Arc::new(CircuitBreaker::new(1));
        breaker.record_failure();
        let h = harness_with(
            search_with_pages(2),
            StubTransport::new(valid_report_json("EV")),
            Arc::new(RecordingExporter::new()),
            Some(breaker),
        );
        let state = h.pipeline.run(QUERY).await;

        assert_eq!(state.violations(), ["circuit_breaker_open"]);
        assert!(state.outputs().is_empty());
        assert!(state.tools_used().is_empty());
        assert_eq!(h.search.search_calls(), 0);
        assert_eq!(h.transport.calls(), 0);
        assert_eq!(
            h.audit.steps(),
            vec![steps::GRAPH_CIRCUIT_OPEN, steps::GRAPH_RUN_COMPLETE]
        );
        assert_eq!(h.audit.summaries().len(), 1);
    }

    #[tokio::test]
    async fn test_search_failures_trip_the_shared_breaker() {
        let breaker = Arc::new(CircuitBreaker::new(2));
        let h = harness_with(
            StubSearch::failing("connection refused"),
            StubTransport::new("no json here"),
            Arc::new(RecordingExporter::new()),
            Some(Arc::clone(&breaker)),
        );

        let first = h.pipeline.run(QUERY).await;
        assert!(first.has_violation("researcher_failed: "));
        assert_eq!(breaker.failures(), 1);

        // Other stage failures do not feed the breaker
        assert!(first.has_violation("writer_json_parse_failure"));
        assert_eq!(first.failure_count(), 2);

        h.pipeline.run(QUERY).await;
        assert!(breaker.is_open());

        let third = h.pipeline.run(QUERY).await;
        assert_eq!(third.violations(), ["circuit_breaker_open"]);
        assert_eq!(h.search.search_calls(), 2);
    }

    #[tokio::test]
    async fn test_stage_panic_is_isolated() {
        let search = Arc::new(search_with_pages(2));
        let (generator, transport) = generator_over(StubTransport::scripted(
            vec![Ok(valid_report_json("EV"))],
            ARTICLE,
        ));
        let pipeline = ResearchPipeline::builder()
            .search(search)
            .generator(generator)
            .exporter(Arc::new(RecordingExporter::new()))
            .stage(PipelineStep::Analyze, Arc::new(PanickingStage::new("analyst")))
            .build()
            .unwrap();

        let state = pipeline.run(QUERY).await;

        assert!(state.has_violation("analyst_failed"));
        assert_eq!(state.failure_count(), 1);
        assert!(!state.has_output(keys::FACTS));
        // Research output survives the panic
        assert_eq!(state.docs.len(), 2);
        assert!(state.report().is_some());
        assert_eq!(transport.calls(), 2);
        assert_eq!(pipeline.breaker().failures(), 0);
    }

    #[tokio::test]
    async fn test_research_panic_feeds_the_breaker() {
        let (generator, _transport) = generator_over(StubTransport::new("{}"));
        let pipeline = ResearchPipeline::builder()
            .search(Arc::new(StubSearch::empty()))
            .generator(generator)
            .exporter(Arc::new(RecordingExporter::new()))
            .stage(PipelineStep::Research, Arc::new(PanickingStage::new("researcher")))
            .build()
            .unwrap();

        let state = pipeline.run(QUERY).await;
        assert!(state.has_violation("researcher_failed"));
        assert_eq!(pipeline.breaker().failures(), 1);
    }

    #[tokio::test]
    async fn test_jsonl_trace_and_summary_files() {
        let dir = tempfile::tempdir().unwrap();
        let trace = dir.path().join("trace.jsonl");
        let summary = dir.path().join("summary.json");

        let (generator, _transport) = generator_over(StubTransport::scripted(
            vec![Ok(valid_report_json("EV"))],
            ARTICLE,
        ));
        let pipeline = ResearchPipeline::builder()
            .search(Arc::new(search_with_pages(2)))
            .generator(generator)
            .exporter(Arc::new(RecordingExporter::new()))
            .audit(Arc::new(JsonlAuditSink::new(&trace, &summary)))
            .build()
            .unwrap();
        pipeline.run(QUERY).await;

        let lines: Vec<serde_json::Value> = std::fs::read_to_string(&trace)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.first().unwrap()["step"], steps::RESEARCHER_WEB_SEARCH);
        assert_eq!(lines.last().unwrap()["step"], steps::GRAPH_RUN_COMPLETE);
        assert!(lines.iter().all(|line| line["time"].is_string()));
        assert_eq!(lines[0]["data"], json!({"count": 2, "with_full_text": 2}));

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&summary).unwrap()).unwrap();
        assert_eq!(written["query"], QUERY);
        assert_eq!(written["outputs"]["report"]["title"], "EV");
        assert_eq!(written["violations"], json!([]));
    }
}
