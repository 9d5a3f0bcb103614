use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::debug;

use haggle_agent::llm::{CompletionClient, HttpCompletionClient};
use haggle_agent::orchestrator::{Negotiator, TurnOutcome};
use haggle_agent::prompt::quoted_price;
use haggle_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};
use haggle_core::domain::farmer::FarmerId;
use haggle_core::domain::good::{default_catalog, Good};
use haggle_core::negotiation::machine::NegotiationPolicy;
use haggle_core::negotiation::session::{SessionStatus, TradeSide};
use haggle_core::world::generate::{generate_world, GenerationParams};
use haggle_core::world::map::World;

pub struct PlayArgs {
    pub seed: Option<u64>,
    pub config_path: Option<PathBuf>,
    pub max_turns: Option<u32>,
}

pub async fn run(args: PlayArgs) -> Result<()> {
    // An explicitly named config file must exist; the default one is optional.
    let require_file = args.config_path.is_some();
    let config = AppConfig::load(LoadOptions {
        config_path: args.config_path,
        require_file,
        overrides: ConfigOverrides {
            seed: args.seed,
            max_turns: args.max_turns,
            ..ConfigOverrides::default()
        },
    })?;
    init_logging(&config);

    let params = GenerationParams {
        n_locations: config.game.n_locations,
        year_length: config.game.year_length,
        ..GenerationParams::default()
    };
    let world = generate_world(
        config.game.seed,
        default_catalog(),
        config.game.starting_funds,
        config.game.travel_cost_multiplier,
        &params,
    );
    debug!(
        seed = config.game.seed,
        locations = world.locations.len(),
        farmers = world.farmers.len(),
        "world generated"
    );

    let client = HttpCompletionClient::new(&config.llm)?;
    let policy = NegotiationPolicy {
        unparseable_budget: config.game.unparseable_budget,
        max_turns: config.game.max_turns,
    };
    let negotiator = Negotiator::new(
        client,
        world.catalog.clone(),
        policy,
        config.llm.max_retries,
        config.llm.timeout_secs,
    )?;

    let input = BufReader::new(tokio::io::stdin()).lines();
    Game { world, negotiator, input }.run().await
}

fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        LogFormat::Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

struct Game<C: CompletionClient> {
    world: World,
    negotiator: Negotiator<C>,
    input: Lines<BufReader<Stdin>>,
}

impl<C: CompletionClient> Game<C> {
    async fn run(mut self) -> Result<()> {
        println!("You arrive at the market roads with {}.", self.world.player.print_funds());
        println!("Buy low, sell high, and mind your travel costs. Type `help` for commands.");
        println!();
        println!("{}", self.describe_location()?);

        loop {
            prompt(&format!(
                "{} @ {} > ",
                self.world.player.print_funds(),
                self.current_location_name()?
            ));
            let Some(line) = self.input.next_line().await? else {
                return Ok(());
            };
            let line = line.trim().to_string();
            let (verb, rest) = split_command(&line);

            match verb {
                "" => {}
                "look" => println!("{}", self.describe_location()?),
                "inventory" | "inv" => println!("{}", self.describe_player()),
                "go" => self.travel(rest)?,
                "talk" => {
                    let Some(farmer_id) = self.resolve_farmer(rest) else {
                        println!("No farmer called `{rest}` here. Try `look`.");
                        continue;
                    };
                    self.farmer_menu(&farmer_id).await?;
                }
                "help" => println!("{}", HELP_TEXT),
                "quit" | "exit" => {
                    println!("You pack up and head home.");
                    return Ok(());
                }
                _ => println!("Unknown command `{verb}`. Type `help`."),
            }
        }
    }

    async fn farmer_menu(&mut self, farmer_id: &FarmerId) -> Result<()> {
        let farmer_name = self.farmer_name(farmer_id)?;
        println!("{farmer_name} looks up from the wagon.");
        println!("{}", self.describe_farmer_goods(farmer_id)?);

        loop {
            prompt(&format!("{} | {} > ", self.world.player.print_funds(), farmer_name));
            let Some(line) = self.input.next_line().await? else {
                return Ok(());
            };
            let line = line.trim().to_string();
            let (verb, rest) = split_command(&line);

            match verb {
                "" => {}
                "back" => return Ok(()),
                "goods" => println!("{}", self.describe_farmer_goods(farmer_id)?),
                "inventory" | "inv" => println!("{}", self.describe_player()),
                "buy" | "sell" => {
                    let Some(good) = resolve_good(&self.world.catalog, rest).cloned() else {
                        println!("Nobody around here trades `{rest}`.");
                        continue;
                    };
                    let side = if verb == "buy" {
                        TradeSide::PlayerBuys
                    } else {
                        TradeSide::PlayerSells
                    };
                    if side == TradeSide::PlayerBuys
                        && self.farmer_stock(farmer_id, &good)? == 0
                    {
                        println!("{farmer_name} has no {} to sell.", good.display_name);
                        continue;
                    }
                    if side == TradeSide::PlayerSells
                        && self.world.player.inventory.quantity_of(&good.id) == 0
                    {
                        println!("You have no {} to sell.", good.display_name);
                        continue;
                    }
                    self.negotiate(farmer_id, good, side).await?;
                }
                _ => println!("Commands here: buy <good>, sell <good>, goods, inventory, back."),
            }
        }
    }

    /// One full negotiation: open a session, loop player turns against the
    /// model, and narrate whichever terminal the session reaches. Ctrl-C
    /// while the farmer is "thinking" withdraws and discards the reply.
    async fn negotiate(
        &mut self,
        farmer_id: &FarmerId,
        good: Good,
        side: TradeSide,
    ) -> Result<()> {
        let farmer_name = self.farmer_name(farmer_id)?;
        {
            let (player, farmer) = self.world.trade_parties_mut(farmer_id)?;
            self.negotiator.open(farmer, &good, side, player)?;
        }
        match side {
            TradeSide::PlayerBuys => {
                println!("You ask {farmer_name} about their {}.", good.display_name)
            }
            TradeSide::PlayerSells => {
                println!("You show {farmer_name} your {}.", good.display_name)
            }
        }
        println!("Say your piece. `back` walks away, `inventory` checks your packs.");

        loop {
            prompt(&format!("{} > ", self.world.player.print_funds()));
            let Some(line) = self.input.next_line().await? else {
                self.negotiator.withdraw()?;
                self.negotiator.take_finished();
                return Ok(());
            };
            let line = line.trim().to_string();

            match line.as_str() {
                "back" | "cancel" => {
                    self.negotiator.withdraw()?;
                    self.negotiator.take_finished();
                    println!("You step away from the haggling.");
                    return Ok(());
                }
                "inventory" | "inv" => {
                    println!("{}", self.describe_player());
                    continue;
                }
                _ => {}
            }

            // An empty line only resumes a pending model turn.
            let awaiting = self
                .negotiator
                .session()
                .is_some_and(|session| session.status == SessionStatus::AwaitingModel);
            if line.is_empty() && !awaiting {
                continue;
            }

            let outcome = {
                let (player, farmer) = self.world.trade_parties_mut(farmer_id)?;
                tokio::select! {
                    outcome = self.negotiator.submit(&line, player, farmer, &good) => Some(outcome?),
                    _ = tokio::signal::ctrl_c() => None,
                }
            };
            let outcome = match outcome {
                Some(outcome) => outcome,
                None => {
                    // The dropped submit future aborts any request in flight.
                    self.negotiator.withdraw()?;
                    println!();
                    println!("You wave {farmer_name} off mid-sentence.");
                    TurnOutcome::Withdrawn
                }
            };

            match outcome {
                TurnOutcome::FarmerReplied { text, .. } => {
                    println!("{farmer_name}: {}", presentable(&text));
                }
                TurnOutcome::Settled { text, settlement } => {
                    println!("{farmer_name}: {}", presentable(&text));
                    let direction = match settlement.side {
                        TradeSide::PlayerBuys => "You hand over",
                        TradeSide::PlayerSells => "You pocket",
                    };
                    println!(
                        "{direction} ${:.2} for {} {}(s) of {}. Deal done.",
                        settlement.total, settlement.quantity, good.unit, good.display_name
                    );
                    self.negotiator.take_finished();
                    return Ok(());
                }
                TurnOutcome::SessionAborted { reason, text } => {
                    if let Some(text) = text {
                        println!("{farmer_name}: {}", presentable(&text));
                    }
                    println!("{}", reason.narrative());
                    self.negotiator.take_finished();
                    return Ok(());
                }
                TurnOutcome::Withdrawn => {
                    self.negotiator.take_finished();
                    return Ok(());
                }
                TurnOutcome::Distracted => {
                    println!("{farmer_name} seems distracted. Press enter to try again.");
                }
            }
        }
    }

    fn travel(&mut self, destination: &str) -> Result<()> {
        if destination.is_empty() {
            println!("Go where? Try `look` for nearby markets.");
            return Ok(());
        }
        let Some(location_id) = self
            .world
            .locations
            .iter()
            .find(|location| location.name.eq_ignore_ascii_case(destination))
            .map(|location| location.id.clone())
        else {
            println!("No road leads to `{destination}`.");
            return Ok(());
        };

        match self.world.move_player(&location_id) {
            Ok(cost) => {
                println!("The road costs you ${cost:.2}.");
                println!("{}", self.describe_location()?);
            }
            Err(error) => println!("{error}"),
        }
        Ok(())
    }

    fn describe_location(&self) -> Result<String> {
        let location = self
            .world
            .current_location()
            .ok_or_else(|| anyhow!("player location missing from the map"))?;

        let mut lines = vec![format!("You are at the {} market (day {}).", location.name, self.world.day)];

        let farmers = self.world.farmers_at(&location.id);
        if farmers.is_empty() {
            lines.push("No farmers are trading here today.".to_string());
        } else {
            lines.push("Farmers at their wagons:".to_string());
            for farmer in farmers {
                lines.push(format!("  - {} (`talk {}`)", farmer.name, farmer.name));
            }
        }

        lines.push("Roads out:".to_string());
        for (destination, cost) in self.world.nearest_locations(5) {
            lines.push(format!("  - {} (${cost:.2})", destination.name));
        }
        Ok(lines.join("\n"))
    }

    fn describe_player(&self) -> String {
        let mut lines = vec![format!("Funds: {}", self.world.player.print_funds())];
        let mut any = false;
        for (good_id, quantity) in self.world.player.inventory.stocked() {
            if let Some(good) = resolve_good(&self.world.catalog, &good_id.0) {
                lines.push(format!("  - {} {}(s) of {}", quantity, good.unit, good.display_name));
                any = true;
            }
        }
        if !any {
            lines.push("  - nothing but road dust".to_string());
        }
        lines.join("\n")
    }

    fn describe_farmer_goods(&self, farmer_id: &FarmerId) -> Result<String> {
        let farmer = self
            .world
            .farmer(farmer_id)
            .ok_or_else(|| anyhow!("farmer {farmer_id} missing from the world"))?;

        let mut lines = vec![format!("{} is trading:", farmer.name)];
        let mut any = false;
        for (good_id, quantity) in farmer.inventory.stocked() {
            if let Some(good) = resolve_good(&self.world.catalog, &good_id.0) {
                lines.push(format!(
                    "  - {} {}(s) of {}: asks ${}, pays ${}",
                    quantity,
                    good.unit,
                    good.display_name,
                    quoted_price(farmer, good, TradeSide::PlayerBuys),
                    quoted_price(farmer, good, TradeSide::PlayerSells)
                ));
                any = true;
            }
        }
        if !any {
            lines.push("  - an empty wagon".to_string());
        }
        lines.push("Commands: buy <good>, sell <good>, goods, inventory, back.".to_string());
        Ok(lines.join("\n"))
    }

    fn resolve_farmer(&self, name: &str) -> Option<FarmerId> {
        if name.is_empty() {
            return None;
        }
        let here = self.world.farmers_at(&self.world.player.location);
        let lowered = name.to_ascii_lowercase();
        here.iter()
            .find(|farmer| farmer.name.to_ascii_lowercase().contains(&lowered))
            .map(|farmer| farmer.id.clone())
    }

    fn farmer_name(&self, farmer_id: &FarmerId) -> Result<String> {
        self.world
            .farmer(farmer_id)
            .map(|farmer| farmer.name.clone())
            .ok_or_else(|| anyhow!("farmer {farmer_id} missing from the world"))
    }

    fn farmer_stock(&self, farmer_id: &FarmerId, good: &Good) -> Result<u32> {
        self.world
            .farmer(farmer_id)
            .map(|farmer| farmer.inventory.quantity_of(&good.id))
            .ok_or_else(|| anyhow!("farmer {farmer_id} missing from the world"))
    }

    fn current_location_name(&self) -> Result<String> {
        self.world
            .current_location()
            .map(|location| location.name.clone())
            .ok_or_else(|| anyhow!("player location missing from the map"))
    }
}

const HELP_TEXT: &str = "\
Commands:
  look              describe this market, its farmers, and the roads out
  go <market>       travel to another market (costs money, takes a day)
  talk <farmer>     walk up to a farmer's wagon
  inventory         your funds and goods
  quit              end the game";

fn prompt(text: &str) {
    print!("{text}");
    let _ = std::io::stdout().flush();
}

fn split_command(line: &str) -> (&str, &str) {
    match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    }
}

/// Match a good by id or display name, case-insensitively.
fn resolve_good<'a>(catalog: &'a [Good], name: &str) -> Option<&'a Good> {
    let lowered = name.trim().to_ascii_lowercase();
    if lowered.is_empty() {
        return None;
    }
    catalog.iter().find(|good| {
        good.id.0.to_ascii_lowercase() == lowered
            || good.display_name.to_ascii_lowercase() == lowered
    })
}

/// The farmer's reply without its trailing decision marker. Replies that
/// are nothing but the marker show as-is rather than as a blank line.
fn presentable(text: &str) -> String {
    let stripped = text
        .lines()
        .filter(|line| !line.trim().to_ascii_uppercase().starts_with("DECISION:"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();
    if stripped.is_empty() {
        text.trim().to_string()
    } else {
        stripped
    }
}
