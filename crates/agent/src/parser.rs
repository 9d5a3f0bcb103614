use haggle_core::negotiation::session::ParsedIntent;

/// Phrases that end the negotiation outright.
const REFUSAL_PHRASES: &[&str] = &[
    "not interested",
    "no deal today",
    "be on your way",
    "this conversation is over",
    "i refuse",
    "get off my land",
    "done talking",
    "i'm done here",
    "take your business elsewhere",
];

/// Phrases that decline the standing proposal but keep talking.
const REJECT_PHRASES: &[&str] = &[
    "no deal",
    "can't do that",
    "cannot do that",
    "too low",
    "too steep",
    "not enough",
    "no thanks",
    "you'll have to do better",
    "not for that price",
    "i'll pass",
    "think again",
];

const ACCEPT_PHRASES: &[&str] = &[
    "it's a deal",
    "its a deal",
    "you have a deal",
    "we have a deal",
    "you've got a deal",
    "you've got yourself a deal",
    "i accept",
    "agreed",
    "sold!",
    "shake on it",
    "done deal",
    "deal!",
];

const OFFER_PHRASES: &[&str] = &[
    "how about",
    "what about",
    "i can do",
    "i could do",
    "i'll offer",
    "i'll give you",
    "i'll let",
    "make it",
    "best i can do",
    "for $",
];

/// Read one model reply into a structured intent. Total: any text maps to
/// some intent, with `Unparseable` as the floor. The structured DECISION
/// line is authoritative; the phrase heuristics only catch replies where
/// the model broke the contract but its meaning is still plain.
pub fn parse_reply(raw: &str) -> ParsedIntent {
    if let Some(intent) = parse_decision_line(raw) {
        return intent;
    }
    if let Some(intent) = parse_freeform(raw) {
        return intent;
    }
    ParsedIntent::Unparseable { raw: raw.to_string() }
}

/// Read a player utterance for proposed terms. Players type freely, so
/// this is best-effort: a recognizable quantity/price pair becomes the
/// offer on the table, anything else leaves the standing proposal alone.
pub fn parse_player_offer(raw: &str) -> Option<ParsedIntent> {
    let normalized = raw.to_ascii_lowercase();
    extract_terms(&normalized)
        .map(|(price, quantity)| ParsedIntent::MakeOffer { price, quantity })
}

/// The last well-formed `DECISION:` line wins, so narrative text above the
/// marker never interferes.
fn parse_decision_line(raw: &str) -> Option<ParsedIntent> {
    raw.lines().rev().find_map(|line| {
        let upper = line.trim().to_ascii_uppercase();
        let rest = upper.strip_prefix("DECISION:")?.trim().to_string();
        match rest.as_str() {
            "ACCEPT" => Some(ParsedIntent::Accept),
            "REJECT" => Some(ParsedIntent::Reject),
            "WALK" | "REFUSE" => Some(ParsedIntent::Refuse),
            _ => rest
                .strip_prefix("OFFER")
                .and_then(parse_offer_terms)
                .map(|(price, quantity)| ParsedIntent::CounterOffer { price, quantity }),
        }
    })
}

/// Terms after an OFFER keyword: `<quantity> @ <price>`, tolerating `$`,
/// `AT`, and `FOR` as separators. Both numbers must be positive integers.
fn parse_offer_terms(rest: &str) -> Option<(u32, u32)> {
    let cleaned = rest.replace(['@', '$'], " ").replace(" AT ", " ").replace(" FOR ", " ");
    let mut numbers = cleaned.split_whitespace().filter_map(parse_positive_int);
    let quantity = numbers.next()?;
    let price = numbers.next()?;
    if numbers.next().is_some() {
        return None;
    }
    Some((price, quantity))
}

fn parse_freeform(raw: &str) -> Option<ParsedIntent> {
    let normalized = raw.to_ascii_lowercase();

    if contains_any(&normalized, REFUSAL_PHRASES) {
        return Some(ParsedIntent::Refuse);
    }
    if contains_any(&normalized, OFFER_PHRASES) {
        if let Some((price, quantity)) = extract_terms(&normalized) {
            return Some(ParsedIntent::CounterOffer { price, quantity });
        }
    }
    if contains_any(&normalized, REJECT_PHRASES) {
        return Some(ParsedIntent::Reject);
    }
    if contains_any(&normalized, ACCEPT_PHRASES) {
        return Some(ParsedIntent::Accept);
    }
    None
}

fn contains_any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| text.contains(phrase))
}

/// Pull (price, quantity) out of free text. A `$`-prefixed integer or an
/// integer after a price word reads as the price; the first other integer
/// reads as the quantity. Anything fractional disqualifies the token.
fn extract_terms(text: &str) -> Option<(u32, u32)> {
    let tokens = tokenize(text);
    let mut price = None;
    let mut quantity = None;
    for (index, token) in tokens.iter().enumerate() {
        if let Some(rest) = token.strip_prefix('$') {
            if price.is_none() {
                price = parse_positive_int(rest);
            }
            continue;
        }
        let after_price_word = index > 0
            && matches!(tokens[index - 1].as_str(), "for" | "at" | "each" | "apiece");
        match parse_positive_int(token) {
            Some(value) if after_price_word && price.is_none() => price = Some(value),
            Some(value) if quantity.is_none() => quantity = Some(value),
            _ => {}
        }
    }
    Some((price?, quantity?))
}

fn tokenize(text: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_ascii_alphanumeric() || matches!(character, '$' | '.' | ',') {
            sanitized.push(character);
        } else {
            sanitized.push(' ');
        }
    }
    sanitized.split_whitespace().map(|token| token.to_string()).collect()
}

/// Strictly positive whole number; trailing sentence punctuation is
/// tolerated, fractional or grouped digits are not.
fn parse_positive_int(token: &str) -> Option<u32> {
    let trimmed = token.trim_end_matches(['.', ',', '!', '?']);
    match trimmed.parse::<u32>() {
        Ok(value) if value > 0 => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use haggle_core::negotiation::session::ParsedIntent;

    use super::{parse_player_offer, parse_reply};

    #[test]
    fn decision_line_accept_wins_over_the_narrative() {
        let reply = "Hm, you drive a hard bargain, friend.\nDECISION: ACCEPT";
        assert_eq!(parse_reply(reply), ParsedIntent::Accept);
    }

    #[test]
    fn decision_line_offer_carries_quantity_then_price() {
        let reply = "Five crates, but not for less than eight.\nDECISION: OFFER 5 @ 8";
        assert_eq!(parse_reply(reply), ParsedIntent::CounterOffer { price: 8, quantity: 5 });
    }

    #[test]
    fn decision_line_is_case_insensitive_and_tolerates_dollar_signs() {
        assert_eq!(
            parse_reply("decision: offer 3 @ $12"),
            ParsedIntent::CounterOffer { price: 12, quantity: 3 }
        );
        assert_eq!(parse_reply("Decision: walk"), ParsedIntent::Refuse);
    }

    #[test]
    fn last_decision_line_wins() {
        let reply = "DECISION: REJECT\nOn second thought...\nDECISION: OFFER 2 @ 4";
        assert_eq!(parse_reply(reply), ParsedIntent::CounterOffer { price: 4, quantity: 2 });
    }

    #[test]
    fn malformed_decision_line_falls_back_to_the_text() {
        let reply = "You have a deal.\nDECISION: OFFER plenty @ cheap";
        assert_eq!(parse_reply(reply), ParsedIntent::Accept);
    }

    #[test]
    fn fractional_prices_never_parse_as_terms() {
        let reply = "DECISION: OFFER 5 @ 8.50";
        assert_eq!(
            parse_reply(reply),
            ParsedIntent::Unparseable { raw: reply.to_string() }
        );
    }

    #[test]
    fn zero_quantities_never_parse_as_terms() {
        let reply = "DECISION: OFFER 0 @ 8";
        assert_eq!(
            parse_reply(reply),
            ParsedIntent::Unparseable { raw: reply.to_string() }
        );
    }

    #[test]
    fn no_deal_reads_as_reject_not_accept() {
        assert_eq!(parse_reply("No deal!"), ParsedIntent::Reject);
    }

    #[test]
    fn freeform_counter_offer_extracts_terms() {
        assert_eq!(
            parse_reply("How about 5 crates for $7?"),
            ParsedIntent::CounterOffer { price: 7, quantity: 5 }
        );
        assert_eq!(
            parse_reply("I can do 3 at 9 each."),
            ParsedIntent::CounterOffer { price: 9, quantity: 3 }
        );
    }

    #[test]
    fn gibberish_is_unparseable() {
        let reply = "the wind howls over the fen";
        assert_eq!(parse_reply(reply), ParsedIntent::Unparseable { raw: reply.to_string() });
        assert_eq!(parse_reply(""), ParsedIntent::Unparseable { raw: String::new() });
    }

    #[test]
    fn parsing_is_idempotent_over_raw_text() {
        let replies = ["DECISION: ACCEPT", "How about 2 for $3?", "mumble mumble"];
        for reply in replies {
            assert_eq!(parse_reply(reply), parse_reply(reply));
        }
    }

    #[test]
    fn player_offers_carry_their_terms() {
        assert_eq!(
            parse_player_offer("I'll take 5 crates of apples at 8 each."),
            Some(ParsedIntent::MakeOffer { price: 8, quantity: 5 })
        );
        assert_eq!(
            parse_player_offer("Give me 3 jugs for $4?"),
            Some(ParsedIntent::MakeOffer { price: 4, quantity: 3 })
        );
    }

    #[test]
    fn player_small_talk_carries_no_terms() {
        assert_eq!(parse_player_offer("Fine morning for a trade."), None);
        assert_eq!(parse_player_offer("Can you go lower?"), None);
        assert_eq!(parse_player_offer(""), None);
    }

    #[test]
    fn handles_common_reply_phrasings() {
        struct Case {
            reply: &'static str,
            expected: ParsedIntent,
        }

        let offer = |price, quantity| ParsedIntent::CounterOffer { price, quantity };
        let cases = vec![
            Case { reply: "Agreed, hand over the coin.", expected: ParsedIntent::Accept },
            Case { reply: "You've got yourself a deal.", expected: ParsedIntent::Accept },
            Case { reply: "Sold! Load them up.", expected: ParsedIntent::Accept },
            Case { reply: "We have a deal, trader.", expected: ParsedIntent::Accept },
            Case { reply: "Shake on it and it's done.", expected: ParsedIntent::Accept },
            Case { reply: "Too low. Come back with real money.", expected: ParsedIntent::Reject },
            Case { reply: "No thanks, not at that price.", expected: ParsedIntent::Reject },
            Case { reply: "You'll have to do better than that.", expected: ParsedIntent::Reject },
            Case { reply: "I'll pass on that one.", expected: ParsedIntent::Reject },
            Case { reply: "That's not enough for my apples.", expected: ParsedIntent::Reject },
            Case { reply: "I'm not interested. Good day.", expected: ParsedIntent::Refuse },
            Case { reply: "Get off my land.", expected: ParsedIntent::Refuse },
            Case { reply: "We're done talking.", expected: ParsedIntent::Refuse },
            Case { reply: "Take your business elsewhere.", expected: ParsedIntent::Refuse },
            Case { reply: "How about 4 for $6?", expected: offer(6, 4) },
            Case { reply: "I could do 2 at 11 apiece.", expected: offer(11, 2) },
            Case { reply: "Make it 6 crates for $9 and we talk.", expected: offer(9, 6) },
            Case { reply: "I'll give you 3 for $5.", expected: offer(5, 3) },
            Case { reply: "Best I can do is 8 for $2.", expected: offer(2, 8) },
            Case { reply: "What about 10 bushels at 1 each?", expected: offer(1, 10) },
        ];

        for (index, case) in cases.iter().enumerate() {
            assert_eq!(
                parse_reply(case.reply),
                case.expected,
                "case {index} misread: {}",
                case.reply
            );
        }
    }
}
