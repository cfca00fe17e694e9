use std::path::PathBuf;
use std::time::Instant;

use tts_prosody::{
    engines::rule_based::{ProcessParams, RuleBasedEngine, RuleModelParams},
    tree::{AnnotationTree, NodeKind},
    ProsodyEngine,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut engine = RuleBasedEngine::new();
    let rules_path = PathBuf::from("rules/en");

    let load_start = Instant::now();
    engine.load_rules_with_params(&rules_path, RuleModelParams::default())?;
    println!("Rules loaded in {:.2?}", load_start.elapsed());

    println!("Available voices: {:?}", engine.list_voices());

    let mut tree = AnnotationTree::read_json(&PathBuf::from("demos/utterance.json"))?;
    let params = ProcessParams {
        voice: Some("kim".to_string()),
    };

    let start = Instant::now();
    let result = engine.process(&mut tree, Some(params))?;
    println!(
        "Processed {} segments and {} boundaries in {:.2?}: {} ms, {} F0 targets",
        result.segments,
        result.boundaries,
        start.elapsed(),
        result.total_duration_ms,
        result.f0_targets
    );

    for segment in tree.descendants_of(tree.root(), &[NodeKind::Segment]) {
        println!(
            "{:>4} d={:>4} end={:>5} f0={:?}",
            tree.attr(segment, "p").unwrap_or("?"),
            tree.attr(segment, "d").unwrap_or("-"),
            tree.attr(segment, "end").unwrap_or("-"),
            tree.f0_targets(segment)
        );
    }

    let output = PathBuf::from("utterance.prosody.json");
    tree.write_json(&output)?;
    result.write_json(&PathBuf::from("utterance.summary.json"))?;
    println!("Saved to {}", output.display());

    engine.unload_rules();
    Ok(())
}
