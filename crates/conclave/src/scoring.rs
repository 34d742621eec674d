//! Per-specialist relevance scoring.
//!
//! Every persona in the catalog gets a score for every input, built from the
//! extracted feature vector plus persona-specific keyword bonuses. Scores
//! are clipped to [0, 1]; selection and weight normalization happen in the
//! router, not here.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::analysis::{Complexity, Domain, FeatureVector};
use crate::registry::{Registry, SpecialistId};

/// Score mass multiplier applied to every persona when the input spans
/// multiple competence families.
const MULTI_COMPETENCE_BASELINE: f32 = 0.2;

/// One persona's relevance for one input, with the human-readable trail of
/// how the score was assembled.
#[derive(Debug, Clone, Serialize)]
pub struct SpecialistScore {
    pub id: SpecialistId,
    pub score: f32,
    pub reasoning: Vec<String>,
}

fn rule(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static rule pattern is valid"))
}

macro_rules! bonus_rule {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static Regex {
            static CELL: OnceLock<Regex> = OnceLock::new();
            rule(&CELL, $pattern)
        }
    };
}

bonus_rule!(
    explicit_analytical,
    r"(?i)\b(analizza|analisi|analitico|analitica|analitici|analitiche|esamina|valuta)\b"
);
bonus_rule!(
    brainstorm_request,
    r"(?i)\b(brainstorm|brainstorming|idee|alternative|opzioni|possibilità)\b"
);
bonus_rule!(
    numbered_ideas,
    r"(?i)\b(dammi|fornisci|elenca|lista)\s+\d+\s*(idee|soluzioni|modi|metodi|consigli)\b"
);
bonus_rule!(
    explicit_creative,
    r"(?i)\b(creative|creativo|creativa|creativi|creatività)\b"
);
bonus_rule!(
    innovation_request,
    r"(?i)\b(innovativo|innovativa|innovazione|originale|unico)\b"
);
bonus_rule!(
    content_request,
    r"(?i)\b(scrivi|crea|contenuto|contenuti|articolo|articoli|post)\b"
);
bonus_rule!(
    verification_request,
    r"(?i)\b(verifica|controlla|valida|accuratezza|correttezza)\b"
);
bonus_rule!(
    quality_concern,
    r"(?i)\b(qualità|affidabilità|sicurezza|rischi|problemi)\b"
);
bonus_rule!(
    support_request,
    r"(?i)\b(aiutami|supporto|consiglio|guidami|accompagnami)\b"
);
bonus_rule!(
    human_focus,
    r"(?i)\b(persone|utenti|team|gruppo|comunicazione|relazione)\b"
);
bonus_rule!(
    explanation_request,
    r"(?i)\b(spiega|spiegami|spiegarla|spiegarlo|chiarisci|semplifica)\b"
);

/// Score every persona in the registry for one input. Output order follows
/// registry order, which is also the tie-break order downstream.
pub fn score_all(features: &FeatureVector, input: &str, registry: &Registry) -> Vec<SpecialistScore> {
    registry
        .iter()
        .map(|profile| score_one(profile.id, features, input))
        .collect()
}

fn score_one(id: SpecialistId, features: &FeatureVector, input: &str) -> SpecialistScore {
    let mut score = 0.0f32;
    let mut reasoning = Vec::new();

    // Inputs spanning several families keep every persona in play.
    if features.multi_competence > 0.0 {
        let baseline = features.multi_competence * MULTI_COMPETENCE_BASELINE;
        score += baseline;
        reasoning.push(format!("competenze multiple: +{baseline:.2}"));
    }

    match id {
        SpecialistId::AnalyticTechnical => {
            add(&mut score, &mut reasoning, features.technical * 0.5, "segnale tecnico");
            add(&mut score, &mut reasoning, features.analytical * 0.45, "segnale analitico");
            if explicit_analytical().is_match(input) {
                add(&mut score, &mut reasoning, 0.35, "richiesta analitica esplicita");
            }
            if features.has_domain(Domain::Programming)
                || features.has_domain(Domain::WebDev)
                || features.has_domain(Domain::Analytical)
            {
                add(&mut score, &mut reasoning, 0.25, "dominio tecnico");
            }
            match features.complexity {
                Complexity::High => add(&mut score, &mut reasoning, 0.15, "complessità alta"),
                Complexity::Medium => add(&mut score, &mut reasoning, 0.1, "complessità media"),
                Complexity::Low => {}
            }
        }
        SpecialistId::CreativeIdeator => {
            add(&mut score, &mut reasoning, features.creative * 0.6, "segnale creativo");
            if features.has_domain(Domain::Creative)
                || features.has_domain(Domain::Design)
                || features.has_domain(Domain::Writing)
            {
                add(&mut score, &mut reasoning, 0.35, "dominio creativo");
            }
            if features.has_questions && features.complexity != Complexity::Low {
                add(&mut score, &mut reasoning, 0.2, "domanda aperta");
            }
            if brainstorm_request().is_match(input) {
                add(&mut score, &mut reasoning, 0.3, "richiesta di brainstorming");
            }
            if numbered_ideas().is_match(input) {
                add(&mut score, &mut reasoning, 0.4, "richiesta diretta di idee");
            }
            if explicit_creative().is_match(input) {
                add(&mut score, &mut reasoning, 0.3, "richiesta creativa esplicita");
            }
            if innovation_request().is_match(input) {
                add(&mut score, &mut reasoning, 0.25, "focus su innovazione");
            }
            if content_request().is_match(input) {
                add(&mut score, &mut reasoning, 0.2, "creazione di contenuti");
            }
        }
        SpecialistId::CriticalVerifier => {
            add(&mut score, &mut reasoning, features.analytical * 0.4, "segnale analitico");
            if verification_request().is_match(input) {
                add(&mut score, &mut reasoning, 0.35, "richiesta di verifica");
            }
            if quality_concern().is_match(input) {
                add(&mut score, &mut reasoning, 0.25, "attenzione alla qualità");
            }
            if features.complexity != Complexity::Low {
                add(&mut score, &mut reasoning, 0.15, "complessità non banale");
            }
        }
        SpecialistId::EmpatheticFacilitator => {
            add(&mut score, &mut reasoning, features.emotional * 0.5, "segnale emotivo");
            if support_request().is_match(input) {
                add(&mut score, &mut reasoning, 0.3, "richiesta di supporto");
            }
            if features.has_domain(Domain::Business) {
                add(&mut score, &mut reasoning, 0.2, "dominio business");
            }
            if human_focus().is_match(input) {
                add(&mut score, &mut reasoning, 0.25, "focus sulle persone");
            }
            if explanation_request().is_match(input) {
                add(&mut score, &mut reasoning, 0.2, "richiesta di spiegazione");
            }
        }
    }

    SpecialistScore {
        id,
        score: score.clamp(0.0, 1.0),
        reasoning,
    }
}

fn add(score: &mut f32, reasoning: &mut Vec<String>, amount: f32, label: &str) {
    if amount > 0.0 {
        *score += amount;
        reasoning.push(format!("{label}: +{amount:.2}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::FeatureExtractor;

    fn scores_for(input: &str) -> Vec<SpecialistScore> {
        let registry = Registry::builtin();
        let features = FeatureExtractor::new().extract(input);
        score_all(&features, input, &registry)
    }

    fn score_of(scores: &[SpecialistScore], id: SpecialistId) -> f32 {
        scores.iter().find(|s| s.id == id).map(|s| s.score).unwrap()
    }

    #[test]
    fn test_every_persona_gets_a_score() {
        let scores = scores_for("Spiegami come ottimizzare una query SQL");
        assert_eq!(scores.len(), SpecialistId::ALL.len());
        let ids: Vec<SpecialistId> = scores.iter().map(|s| s.id).collect();
        assert_eq!(ids, SpecialistId::ALL);
        for s in &scores {
            assert!((0.0..=1.0).contains(&s.score));
        }
    }

    #[test]
    fn test_technical_input_favors_analytic() {
        let scores = scores_for("Analizza l'architettura del backend e il codice SQL");
        let analytic = score_of(&scores, SpecialistId::AnalyticTechnical);
        for id in [SpecialistId::CreativeIdeator, SpecialistId::EmpatheticFacilitator] {
            assert!(analytic > score_of(&scores, id));
        }
    }

    #[test]
    fn test_creative_input_favors_ideator() {
        let scores = scores_for("Dammi 5 idee creative per un blog");
        let creative = score_of(&scores, SpecialistId::CreativeIdeator);
        assert!(creative >= 0.99);
        assert!(creative > score_of(&scores, SpecialistId::AnalyticTechnical));
    }

    #[test]
    fn test_emotional_input_favors_facilitator() {
        let scores = scores_for("Sono stressato, aiutami a gestire il lavoro di squadra");
        let empathetic = score_of(&scores, SpecialistId::EmpatheticFacilitator);
        assert!(empathetic > score_of(&scores, SpecialistId::CreativeIdeator));
        assert!(empathetic > score_of(&scores, SpecialistId::CriticalVerifier));
    }

    #[test]
    fn test_multi_competence_lifts_everyone() {
        let plain = scores_for("scrivi qualcosa");
        let multi = scores_for("analizza il codice e proponi idee creative");
        // The baseline term raises even the persona with no direct signal.
        assert!(
            score_of(&multi, SpecialistId::EmpatheticFacilitator)
                >= score_of(&plain, SpecialistId::EmpatheticFacilitator)
        );
        assert!(score_of(&multi, SpecialistId::AnalyticTechnical) > 0.5);
        assert!(score_of(&multi, SpecialistId::CreativeIdeator) > 0.5);
    }

    #[test]
    fn test_reasoning_trail_is_populated() {
        let scores = scores_for("Verifica la qualità di questa analisi");
        let verifier = scores
            .iter()
            .find(|s| s.id == SpecialistId::CriticalVerifier)
            .unwrap();
        assert!(!verifier.reasoning.is_empty());
        assert!(verifier.reasoning.iter().any(|r| r.contains("verifica")));
    }
}
