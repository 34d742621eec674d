//! Prompt templates for reasoning chains and synthesis.

use crate::registry::SpecialistProfile;

/// Upstream APIs reject oversized system prompts well before the model does;
/// cap them the same way the chat endpoint always has.
pub const SYSTEM_PROMPT_MAX_CHARS: usize = 500;

/// Appended to each persona's system prompt when streaming a reasoning chain:
/// the chain must expose only the internal thinking, never the final answer —
/// the answer is produced later by synthesis.
const REASONING_DIRECTIVE: &str = "\n\nMODALITÀ CHAIN OF THOUGHT:\n\
Esponi esclusivamente il tuo ragionamento interno passo per passo dal tuo punto \
di vista di specialista: considerazioni, ipotesi, rischi e approcci possibili. \
NON fornire la risposta finale all'utente — il tuo ragionamento verrà combinato \
con quello di altri specialisti in una sintesi successiva.";

const SYNTHESIS_PROMPT: &str = "Sei un AI Synthesizer esperto che deve creare la risposta finale ottimale combinando multiple chain of thought di specialisti diversi.\n\n\
COMPITO: Analizza le catene di pensiero fornite e crea una risposta finale completa, coerente e ottimizzata che integri i migliori insight di ogni specialista.\n\n\
SPECIALISTI E I LORO RUOLI:\n\
- **Analitico Tecnico (INTJ)**: Fornisce analisi tecniche, soluzioni strutturate, approcci sistematici\n\
- **Creativo Ideatore (ENFP)**: Offre idee innovative, approcci creativi, soluzioni originali\n\
- **Verificatore Critico (ISTJ)**: Valida accuracy, identifica rischi, assicura qualità\n\
- **Facilitatore Empatico (ENFJ)**: Rende accessibile, considera aspetti umani, migliora comunicazione\n\n\
REGOLE DI SINTESI:\n\
1. **Integrazione Intelligente**: Non concatenare semplicemente le risposte, ma integrarle in modo fluido\n\
2. **Peso Contestuale**: Considera i pesi degli specialisti ma adatta al contesto della domanda\n\
3. **Eliminazione Ridondanze**: Rimuovi duplicazioni mantenendo i punti chiave unici\n\
4. **Coerenza Narrativa**: Crea una risposta che scorre naturalmente\n\
5. **Completezza**: Copri tutti gli aspetti importanti emersi dalle chain\n\
6. **Chiarezza**: Rendi la risposta accessibile e ben strutturata\n\n\
FORMATO OUTPUT RICHIESTO (JSON):\n\
{\n\
  \"finalAnswer\": \"Risposta finale completa e ottimizzata che integra tutti gli insight\",\n\
  \"synthesisReasoning\": \"Spiegazione di come hai combinato le diverse catene di pensiero\",\n\
  \"approach\": \"Descrizione dell'approccio di sintesi utilizzato\"\n\
}\n\n\
DOMANDA UTENTE: \"{userQuery}\"\n\n\
CATENE DI PENSIERO DA SINTETIZZARE:\n\n\
{chainOfThoughts}\n\n\
Analizza tutte le catene di pensiero e fornisci la sintesi ottimale in formato JSON:";

/// Build the "internal reasoning only" prompt variant for a persona.
pub fn reasoning_prompt(profile: &SpecialistProfile) -> String {
    format!(
        "{}{}",
        clip(profile.system_prompt, SYSTEM_PROMPT_MAX_CHARS),
        REASONING_DIRECTIVE
    )
}

/// Build the synthesis prompt from the user query and the formatted
/// chain-of-thought block.
pub fn synthesis_prompt(user_query: &str, chain_block: &str) -> String {
    SYNTHESIS_PROMPT
        .replace("{userQuery}", user_query)
        .replace("{chainOfThoughts}", chain_block)
}

/// Truncate to at most `max_bytes`, backing up to a UTF-8 char boundary.
pub fn clip(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
