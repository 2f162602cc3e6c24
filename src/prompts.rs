//! Centralized text shipped to the model and shown to the user
//!
//! Persona prompt, the seed greeting, the fixed apology used on transport
//! failure, the summarize shortcut instruction and the conversation starters.

/// System instruction sent with every model call.
pub const SYSTEM_PROMPT: &str = r#"You are the Health Inclusion Coach, an educational and reflective AI assistant for the Health & Social Care sector. Your purpose is to help students, nurses, and care staff reflect on and learn about inclusion, anti-racism, and creating a more equitable workplace.

Your persona is:
- Empathetic, non-judgmental, and professional.
- Knowledgeable about UK health & social care policies, equality, diversity, and inclusion (EDI) principles.
- A reflective partner, helping users explore their thoughts and scenarios.
- Explicitly NOT an official NHS service.

Your core functions are:
1. Facilitate Reflection: Ask probing questions (e.g., "What power dynamics were at play?") to help users explore biases and experiences.
2. Provide Information: Explain concepts like intersectionality, microaggressions, and allyship.
3. Signpost Resources: Reference official sources like the NHS People Plan, WRES, WDES, and Civility Saves Lives.

Interaction Constraints:
- Do NOT provide legal, HR, or clinical advice.
- Maintain strict confidentiality.
- If a user expresses distress, guide them to appropriate support channels (e.g., Freedom to Speak Up Guardians).
- Use Google Search grounding to provide up-to-date information."#;

/// First AI message of every conversation.
pub const GREETING: &str = "Hello, I'm the Health Inclusion Coach. Think of me as a safe and confidential partner to help you explore topics around equality, diversity, and inclusion. Everything we discuss here is private. How can I support your reflection and learning today?";

/// Replaces the streamed reply when the model call fails.
pub const CONNECTION_APOLOGY: &str =
    "I'm sorry, I'm having trouble connecting right now. Please try again later.";

/// User text synthesized by the summarize shortcut.
pub const SUMMARIZE_INSTRUCTION: &str =
    "Please provide a concise summary of the attached document.";

/// Prefix of the user text synthesized when only a document is submitted.
pub const ANALYZE_DOCUMENT_PREFIX: &str = "Analyze the document: ";

/// Suggestions offered while the conversation holds only the greeting.
pub const CONVERSATION_STARTERS: [&str; 4] = [
    "What are microaggressions?",
    "How can I create an inclusive team culture?",
    "What does it mean to be an ally?",
    "Help me understand unconscious bias.",
];

/// Who a guided scenario is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Students on placement
    Student,
    /// Qualified staff and managers
    Staff,
}

/// A guided role-play opened with a fixed prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scenario {
    /// Short name shown in the list
    pub title: &'static str,
    /// Intended audience
    pub audience: Audience,
    /// One-paragraph setup shown before starting
    pub description: &'static str,
    /// User text that starts the role-play
    pub opening: &'static str,
}

/// Guided role-play scenarios.
pub const SCENARIOS: [Scenario; 2] = [
    Scenario {
        title: "Handover Microaggression",
        audience: Audience::Student,
        description: "You are a nursing student. During a handover, a senior colleague makes a biased comment about a patient's background. Practice how to reflect on this and respond.",
        opening: "Let's start the 'Handover Microaggression' simulation. You are a nursing student in the handover room. A senior nurse says: 'We always have trouble with families from that part of town, they never follow the care plan anyway.' How does that comment make you feel, and what is your first thought about how to respond?",
    },
    Scenario {
        title: "Bias in Recruitment",
        audience: Audience::Staff,
        description: "You are a ward manager on an interview panel. A fellow panelist suggests a candidate \"might not fit in\" due to cultural differences. Practice challenging this bias.",
        opening: "Let's start the 'Bias in Recruitment' simulation. You are a ward manager on an interview panel. After a strong interview from a candidate with a diverse background, your colleague leans over and whispers: 'They were good, but I'm not sure they'd fit the culture of our team. You know what I mean.' How would you like to open a conversation about that 'fit' comment?",
    },
];
