//! Feature extraction over raw user input.
//!
//! Converts a turn's text into a weighted signal vector used by the scorer
//! and the activation selector. All scoring is driven by fixed rule tables
//! (pattern → weight contribution) so the behavior stays deterministic and
//! individually testable; there is no branching logic per rule.
//!
//! The lexicon is bilingual Italian/English, matching the product surface.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// Estimated tokens per word for the upstream tokenizer.
const TOKENS_PER_WORD: f32 = 1.3;

/// Coarse complexity class of an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

/// Domains hinted at by the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Programming,
    WebDev,
    Data,
    Business,
    Design,
    Writing,
    Creative,
    Analytical,
}

/// Weighted signal vector derived from one input. Ephemeral: lives for a
/// single routing decision.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureVector {
    pub words: usize,
    pub tokens: usize,
    pub complexity: Complexity,
    pub has_questions: bool,
    /// Per-dimension weights, each clipped to [0, 1].
    pub technical: f32,
    pub creative: f32,
    pub analytical: f32,
    pub emotional: f32,
    pub urgency: f32,
    /// Extra score mass for inputs spanning several competence families.
    pub multi_competence: f32,
    pub domains: Vec<Domain>,
}

impl FeatureVector {
    /// Largest of the four competence dimension weights (urgency excluded).
    pub fn max_dimension(&self) -> f32 {
        self.technical
            .max(self.creative)
            .max(self.analytical)
            .max(self.emotional)
    }

    pub fn has_domain(&self, domain: Domain) -> bool {
        self.domains.contains(&domain)
    }
}

// ── Rule tables ──────────────────────────────────────────────────────────

/// Technical vocabulary, matched by case-insensitive substring.
const TECHNICAL_TERMS: &[&str] = &[
    "algoritmo",
    "database",
    "api",
    "framework",
    "codice",
    "programmazione",
    "react",
    "typescript",
    "javascript",
    "python",
    "sql",
    "html",
    "css",
    "server",
    "client",
    "backend",
    "frontend",
    "deployment",
    "bug",
    "debug",
    "architettura",
    "performance",
    "ottimizzazione",
    "sicurezza",
    "testing",
];

const TECHNICAL_TERM_WEIGHT: f32 = 0.2;

const TECHNICAL_EXTRA: &[(&str, f32)] = &[
    (r"(?i)\b(implementa|develop|deploy|setup|config)\b", 0.15),
    (r"(?i)\b(error|exception|stack trace|log)\b", 0.25),
    (r"(?i)\b(optimization|performance|scalability)\b", 0.2),
];

/// Core creative patterns; each match contributes the same fixed increment.
const CREATIVE_BASE: &[&str] = &[
    r"(?i)\b(crea|creare|scrivere|scrivi|inventare|ideare|progettare|immaginare)\b",
    r"(?i)\b(storia|racconto|poesia|articolo|articoli|blog|contenuto|contenuti)\b",
    r"(?i)\b(creativo|creativa|creativi|creative|originale|innovativo|artistico|design)\b",
    r"(?i)\b(brainstorm|ispirazione|concept|vision)\b",
    r"(?i)\b(idea|idee)\b",
    r"(?i)\b(creatività|innovazione|nuovo|nuovi|nuove)\b",
    r"(?i)\b(suggest|suggerisci|proponi|consigli)\b",
    r"(?i)\b(soluzioni|alternative|opzioni|possibilità)\b",
];

const CREATIVE_BASE_WEIGHT: f32 = 0.35;

const CREATIVE_EXTRA: &[(&str, f32)] = &[
    (
        r"(?i)\b(dammi|fornisci|elenca|lista)\s+\d*\s*(idee|soluzioni|modi|metodi|consigli)\b",
        0.4,
    ),
    (r"(?i)\b(originale|unico|nuovo|fresco|innovativo)\b", 0.25),
    (r"(?i)\b(idea|concept|vision|ispirazione)\b", 0.2),
    (r"(?i)\b(storia|racconto|personaggio|plot)\b", 0.25),
];

const ANALYTICAL_BASE: &[&str] = &[
    r"(?i)\b(analizza|analisi|esamina|valuta|confronta|verifica)\b",
    r"(?i)\b(dati|statistiche|metriche|performance|risultati)\b",
    r"(?i)\b(pro e contro|vantaggi|svantaggi|alternative)\b",
    r"(?i)\b(strategia|pianificazione|metodologia|processo)\b",
    r"(?i)\b(analitico|analitica|analitici|analitiche)\b",
    r"(?i)\b(sistematico|sistematica|metodico|strutturato|logico)\b",
    r"(?i)\b(approfondito|dettagliato|preciso|rigoroso)\b",
    r"(?i)\b(ragionamento|logica|deduzione|studio)\b",
];

const ANALYTICAL_BASE_WEIGHT: f32 = 0.3;

const ANALYTICAL_EXTRA: &[(&str, f32)] = &[
    (r"(?i)\b(confronta|paragona|differenza|similarity)\b", 0.25),
    (r"(?i)\b(migliore|peggiore|ottimale|efficiente)\b", 0.2),
    (r"(?i)\b(verifica|controlla|valida|accurate)\b", 0.2),
];

const EMOTIONAL_BASE: &[&str] = &[
    r"(?i)\b(sento|provo|emozione|tristezza|gioia|rabbia|paura|ansia)\b",
    r"(?i)\b(aiutami|supporto|consiglio|problema personale)\b",
    r"(?i)\b(preoccupato|felice|triste|arrabbiato|confuso|stressato)\b",
    r"(?i)\b(relazione|famiglia|amici|lavoro di squadra)\b",
];

const EMOTIONAL_BASE_WEIGHT: f32 = 0.3;

const EMOTIONAL_EXTRA: &[(&str, f32)] = &[
    (r"(?i)\b(supporto|aiuto|consiglio|guide me)\b", 0.2),
    (r"(?i)\b(difficile|challenging|problema|issue)\b", 0.15),
    (r"(?i)\b(team|gruppo|collaborazione|communication)\b", 0.15),
];

const URGENCY_BASE: &[&str] = &[
    r"(?i)\b(urgente|subito|immediatamente|rapidamente|presto)\b",
    r"(?i)\b(emergency|critico|importante|priorità|deadline)\b",
    r"(?i)\b(help|aiuto|problema|errore|non funziona)\b",
];

const URGENCY_BASE_WEIGHT: f32 = 0.4;

/// Explicit "X and Y" cross-competence phrasing.
const COMBINATION_PATTERNS: &[&str] = &[
    r"(?i)\b(creative|creativo|creativi|creatività)\s+e\s+(analitico|analitica|analitici|analitiche)\b",
    r"(?i)\b(analitico|analitica|analitici|analitiche)\s+e\s+(creative|creativo|creativi|creatività)\b",
    r"(?i)\b(tecnico|tecnica|tecnici|tecniche)\s+e\s+(creativo|creativa|creativi|creative)\b",
    r"(?i)\b(innovativo|innovativa|innovativi|innovative)\s+e\s+(analitico|metodico|strutturato)\b",
];

const COMBINATION_BONUS: f32 = 0.4;
const FAMILY_BONUS: f32 = 0.15;

/// Trivial conversational phrases (checked against normalized input).
const SIMPLE_PHRASES: &[&str] = &[
    r"^(ciao|salve|buongiorno|buonasera|hello|hi|hey)( come stai| come va| tutto bene)?$",
    r"^(come stai|come va|tutto bene)$",
    r"^(grazie( mille)?|prego|scusa|perfetto|ok)$",
    r"^(sì|si|no|forse|bene|male)$",
];

const DOMAIN_KEYWORDS: &[(Domain, &[&str])] = &[
    (
        Domain::Programming,
        &["codice", "programmazione", "sviluppo", "software", "app"],
    ),
    (
        Domain::WebDev,
        &["sito", "web", "html", "css", "frontend", "backend"],
    ),
    (
        Domain::Data,
        &["dati", "database", "sql", "analytics", "report"],
    ),
    (
        Domain::Business,
        &["business", "vendite", "marketing", "strategia", "clienti"],
    ),
    (
        Domain::Design,
        &["design", "ui", "ux", "grafica", "visual", "layout"],
    ),
    (
        Domain::Writing,
        &["scrivi", "testo", "articolo", "content", "blog", "copy"],
    ),
    (
        Domain::Creative,
        &["idee", "creative", "innovative", "brainstorm", "concept"],
    ),
    (
        Domain::Analytical,
        &["analitico", "analitiche", "analisi", "metodico", "rigoroso"],
    ),
];

// ── Compiled rule access ─────────────────────────────────────────────────

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("static rule pattern is valid"))
        .collect()
}

fn compile_weighted(rules: &[(&str, f32)]) -> Vec<(Regex, f32)> {
    rules
        .iter()
        .map(|(p, w)| (Regex::new(p).expect("static rule pattern is valid"), *w))
        .collect()
}

macro_rules! rule_set {
    ($name:ident, $table:expr) => {
        fn $name() -> &'static [Regex] {
            static CELL: OnceLock<Vec<Regex>> = OnceLock::new();
            CELL.get_or_init(|| compile($table))
        }
    };
}

macro_rules! weighted_rule_set {
    ($name:ident, $table:expr) => {
        fn $name() -> &'static [(Regex, f32)] {
            static CELL: OnceLock<Vec<(Regex, f32)>> = OnceLock::new();
            CELL.get_or_init(|| compile_weighted($table))
        }
    };
}

rule_set!(creative_base, CREATIVE_BASE);
rule_set!(analytical_base, ANALYTICAL_BASE);
rule_set!(emotional_base, EMOTIONAL_BASE);
rule_set!(urgency_base, URGENCY_BASE);
rule_set!(combination_rules, COMBINATION_PATTERNS);
rule_set!(simple_phrases, SIMPLE_PHRASES);
weighted_rule_set!(technical_extra, TECHNICAL_EXTRA);
weighted_rule_set!(creative_extra, CREATIVE_EXTRA);
weighted_rule_set!(analytical_extra, ANALYTICAL_EXTRA);
weighted_rule_set!(emotional_extra, EMOTIONAL_EXTRA);

fn question_rule() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| {
        Regex::new(r"(?i)\b(come|cosa|quando|dove|perché|chi)\b").expect("static rule")
    })
}

fn caps_rule() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"\b[A-Z]{2,}\b").expect("static rule"))
}

// ── Extraction ───────────────────────────────────────────────────────────

/// Deterministic, case-insensitive feature extractor.
#[derive(Debug, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract the signal vector for one input. Empty or whitespace-only
    /// input produces an all-zero, `Low` vector; the router rejects it
    /// before any scoring happens.
    pub fn extract(&self, input: &str) -> FeatureVector {
        let trimmed = input.trim();
        let words = trimmed.split_whitespace().count();
        let tokens = (words as f32 * TOKENS_PER_WORD).ceil() as usize;
        let lower = trimmed.to_lowercase();

        let is_simple = is_simple_phrase(trimmed);
        let has_questions = trimmed.contains('?') || question_rule().is_match(trimmed);

        let technical = technical_weight(&lower, trimmed);
        let creative = summed_weight(trimmed, creative_base(), CREATIVE_BASE_WEIGHT)
            + extra_weight(trimmed, creative_extra());
        let creative = creative.min(1.0);
        let analytical = summed_weight(trimmed, analytical_base(), ANALYTICAL_BASE_WEIGHT)
            + extra_weight(trimmed, analytical_extra());
        let analytical = analytical.min(1.0);
        let emotional = emotional_weight(trimmed);
        let urgency = urgency_weight(trimmed);
        let multi_competence = multi_competence_bonus(trimmed, &lower);
        let domains = identify_domains(&lower);

        let complexity = classify_complexity(ComplexityInputs {
            is_simple,
            tokens,
            has_questions,
            technical,
            creative,
            analytical,
            emotional,
            urgency,
            multi_competence,
        });

        FeatureVector {
            words,
            tokens,
            complexity,
            has_questions,
            technical,
            creative,
            analytical,
            emotional,
            urgency,
            multi_competence,
            domains,
        }
    }
}

struct ComplexityInputs {
    is_simple: bool,
    tokens: usize,
    has_questions: bool,
    technical: f32,
    creative: f32,
    analytical: f32,
    emotional: f32,
    urgency: f32,
    multi_competence: f32,
}

fn classify_complexity(inputs: ComplexityInputs) -> Complexity {
    if inputs.is_simple && inputs.tokens <= 5 {
        return Complexity::Low;
    }

    let avg =
        (inputs.technical + inputs.creative + inputs.analytical + inputs.emotional) / 4.0;

    // Cross-competence requests escalate even without a strong single
    // dimension: the bonus term alone is enough.
    if inputs.multi_competence > 0.3 {
        Complexity::High
    } else if inputs.creative > 0.3 {
        if inputs.tokens > 15 {
            Complexity::High
        } else {
            Complexity::Medium
        }
    } else if inputs.tokens > 50 || avg > 0.6 || inputs.urgency > 0.7 {
        Complexity::High
    } else if inputs.tokens > 15 || avg > 0.3 || inputs.has_questions {
        Complexity::Medium
    } else {
        Complexity::Low
    }
}

fn summed_weight(input: &str, rules: &[Regex], per_match: f32) -> f32 {
    let matched = rules.iter().filter(|r| r.is_match(input)).count();
    (matched as f32 * per_match).min(1.0)
}

fn extra_weight(input: &str, rules: &[(Regex, f32)]) -> f32 {
    rules
        .iter()
        .filter(|(r, _)| r.is_match(input))
        .map(|(_, w)| w)
        .sum()
}

fn technical_weight(lower: &str, input: &str) -> f32 {
    let mut weight = TECHNICAL_TERMS
        .iter()
        .filter(|term| lower.contains(*term))
        .count() as f32
        * TECHNICAL_TERM_WEIGHT;
    weight += extra_weight(input, technical_extra());
    weight.min(1.0)
}

fn emotional_weight(input: &str) -> f32 {
    let mut weight = if emotional_base().iter().any(|r| r.is_match(input)) {
        EMOTIONAL_BASE_WEIGHT
    } else {
        0.0
    };
    weight += extra_weight(input, emotional_extra());
    weight.min(1.0)
}

fn urgency_weight(input: &str) -> f32 {
    let mut urgency = if urgency_base().iter().any(|r| r.is_match(input)) {
        URGENCY_BASE_WEIGHT
    } else {
        0.0
    };

    let exclamations = input.matches('!').count() as f32;
    urgency += (exclamations * 0.2).min(0.3);

    let caps_words = caps_rule().find_iter(input).count() as f32;
    urgency += (caps_words * 0.1).min(0.2);

    urgency.min(1.0)
}

/// Count how many competence families the input touches and award the bonus
/// for explicit "X e Y" combination phrasing.
fn multi_competence_bonus(input: &str, lower: &str) -> f32 {
    let mut families = 0usize;
    if creative_base().iter().any(|r| r.is_match(input)) {
        families += 1;
    }
    if analytical_base().iter().any(|r| r.is_match(input)) {
        families += 1;
    }
    if TECHNICAL_TERMS.iter().any(|term| lower.contains(term)) {
        families += 1;
    }
    if emotional_base().iter().any(|r| r.is_match(input)) {
        families += 1;
    }

    let mut bonus = 0.0;
    if combination_rules().iter().any(|r| r.is_match(input)) {
        bonus += COMBINATION_BONUS;
    }
    if families >= 2 {
        bonus += families as f32 * FAMILY_BONUS;
    }
    bonus.min(1.0)
}

fn identify_domains(lower: &str) -> Vec<Domain> {
    DOMAIN_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(domain, _)| *domain)
        .collect()
}

/// Whether the input is one of the fixed trivial conversational phrases.
pub(crate) fn is_simple_phrase(input: &str) -> bool {
    let normalized = normalize(input);
    !normalized.is_empty() && simple_phrases().iter().any(|r| r.is_match(&normalized))
}

/// Lowercase, strip punctuation, collapse whitespace.
pub(crate) fn normalize(input: &str) -> String {
    let lowered = input.to_lowercase();
    let kept: String = lowered
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}
