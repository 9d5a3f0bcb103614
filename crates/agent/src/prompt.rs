use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tera::{Context, Tera};
use thiserror::Error;

use haggle_core::domain::farmer::{Farmer, Temperament};
use haggle_core::domain::good::{find_good, Good};
use haggle_core::negotiation::session::{NegotiationSession, Speaker, TradeSide};

use crate::llm::ChatMessage;

/// System prompt for the farmer persona. Everything the model needs is in
/// here: who it is, what it holds, the quoted price, and the one-line
/// decision contract the parser keys on.
const FARMER_SYSTEM_TEMPLATE: &str = "\
You are {{ farmer_name }}, a farmer trading at the {{ location }} market. {{ persona }}
{% if buying %}A traveling trader wants to buy {{ good_name }} from you. You hold {{ stock }} \
{{ unit }}(s) of {{ good_name }} and your asking price is ${{ quoted_price }} per {{ unit }}.\
{% else %}A traveling trader wants to sell you {{ good_name }}. You would pay around \
${{ quoted_price }} per {{ unit }}, and you carry ${{ funds }} in cash.{% endif %}
The rest of your wagon: {{ wagon }}.
Haggle hard but honestly. Never agree to terms you cannot actually supply or pay for, and \
never trade goods you do not hold. Prices are whole dollars per unit. Keep each reply under \
three sentences and stay in character.
End every reply with exactly one line in one of these forms and nothing after it:
DECISION: OFFER <quantity> @ <price>
DECISION: ACCEPT
DECISION: REJECT
DECISION: WALK
Use OFFER to propose or counter terms, ACCEPT only when you agree to the exact terms on the \
table, REJECT to turn down the latest proposal but keep talking, and WALK to end the \
negotiation for good.";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt template failure: {0}")]
    Template(#[from] tera::Error),
}

pub struct PromptBuilder {
    tera: Tera,
}

impl PromptBuilder {
    pub fn new() -> Result<Self, PromptError> {
        let mut tera = Tera::default();
        tera.add_raw_template("farmer_system", FARMER_SYSTEM_TEMPLATE)?;
        Ok(Self { tera })
    }

    /// Render the persona prompt for one farmer, good, and trade direction.
    /// Rendering is pure: the same inputs always produce the same prompt.
    pub fn system_prompt(
        &self,
        farmer: &Farmer,
        good: &Good,
        side: TradeSide,
        catalog: &[Good],
    ) -> Result<String, PromptError> {
        let buying = side == TradeSide::PlayerBuys;

        let mut context = Context::new();
        context.insert("farmer_name", &farmer.name);
        context.insert("location", &farmer.location.0);
        context.insert("persona", persona_line(farmer));
        context.insert("buying", &buying);
        context.insert("good_name", &good.display_name);
        context.insert("unit", &good.unit);
        context.insert("stock", &farmer.inventory.quantity_of(&good.id));
        context.insert("quoted_price", &quoted_price(farmer, good, side));
        context.insert("funds", &format!("{:.2}", farmer.funds));
        context.insert("wagon", &wagon_summary(farmer, good, catalog));

        Ok(self.tera.render("farmer_system", &context)?)
    }

    /// Full message list for one completion request: persona prompt first,
    /// then the transcript with player lines as user turns and farmer lines
    /// as assistant turns.
    pub fn conversation(
        &self,
        farmer: &Farmer,
        good: &Good,
        side: TradeSide,
        session: &NegotiationSession,
        catalog: &[Good],
    ) -> Result<Vec<ChatMessage>, PromptError> {
        let mut messages =
            vec![ChatMessage::system(self.system_prompt(farmer, good, side, catalog)?)];
        for entry in &session.transcript {
            messages.push(match entry.speaker {
                Speaker::Player => ChatMessage::user(&entry.text),
                Speaker::Farmer => ChatMessage::assistant(&entry.text),
            });
        }
        Ok(messages)
    }
}

/// Price the farmer quotes for one good. Offer terms are whole dollars, so
/// quotes are too: the fractional book price rounds up to the next dollar
/// and never drops below one.
pub fn quoted_price(farmer: &Farmer, good: &Good, side: TradeSide) -> u32 {
    let book = match side {
        TradeSide::PlayerBuys => farmer.buy_price(good),
        TradeSide::PlayerSells => farmer.sell_price(good),
    };
    whole_dollars(book)
}

fn whole_dollars(price: Decimal) -> u32 {
    price.ceil().to_u32().unwrap_or(1).max(1)
}

fn persona_line(farmer: &Farmer) -> &'static str {
    match farmer.disposition.temperament {
        Temperament::Gruff => {
            "You are gruff and short with strangers, though fair underneath it."
        }
        Temperament::Cheerful => {
            "You are warm and chatty, as happy to make a friend as a sale."
        }
        Temperament::Shrewd => {
            "You count every cent and never take a first offer."
        }
        Temperament::Skeptical => {
            "You suspect every trader of trying to cheat you and you say so."
        }
        Temperament::Weary => {
            "You are tired of the market and want to close quickly without losing money."
        }
    }
}

/// The farmer's other stock, with per-unit asking prices, in stable order.
fn wagon_summary(farmer: &Farmer, negotiated: &Good, catalog: &[Good]) -> String {
    let mut parts = Vec::new();
    for (good_id, quantity) in farmer.inventory.stocked() {
        if good_id == &negotiated.id {
            continue;
        }
        if let Some(good) = find_good(catalog, good_id) {
            parts.push(format!(
                "{quantity} {}(s) of {} at ${} each",
                good.unit,
                good.display_name,
                quoted_price(farmer, good, TradeSide::PlayerBuys)
            ));
        }
    }
    if parts.is_empty() {
        "nothing else".to_string()
    } else {
        parts.join(", ")
    }
}
