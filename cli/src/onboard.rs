use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Password, Select};
use stepwise_core::agent::write_default_templates;
use stepwise_core::config::{Config, SearchConfig, get_config_path};

const BANNER: &str = r"
    -------------------------------------

     s t e p w i s e
     plan  >  execute  >  replan

    -------------------------------------
";

const PROVIDERS: &[(&str, &str)] = &[
    ("openai", "OpenAI"),
    ("openrouter", "OpenRouter"),
    ("ollama", "Ollama (local)"),
];

fn print_step(step: usize, total: usize, title: &str) {
    println!();
    println!(
        "{}",
        style(format!("[{}/{}] {}", step, total, title))
            .cyan()
            .bold()
    );
    println!();
}

fn setup_provider() -> Result<&'static str> {
    let labels: Vec<&str> = PROVIDERS.iter().map(|(_, label)| *label).collect();
    let selection = Select::new()
        .with_prompt("Select your provider")
        .items(&labels)
        .default(0)
        .interact()
        .context("Failed to select provider")?;

    Ok(PROVIDERS[selection].0)
}

fn setup_api_key(provider: &str) -> Result<String> {
    if provider == "ollama" {
        return Ok(String::new());
    }

    let env_var = match provider {
        "openrouter" => "OPENROUTER_API_KEY",
        _ => "OPENAI_API_KEY",
    };
    if std::env::var(env_var).is_ok_and(|key| !key.is_empty()) {
        println!(
            "  {} Using {} from the environment",
            style("✓").green(),
            style(env_var).cyan()
        );
        return Ok(String::new());
    }

    let api_key: String = Password::new()
        .with_prompt(format!("Enter your {provider} API key"))
        .interact()
        .context("Failed to read API key")?;

    if api_key.trim().is_empty() {
        return Err(anyhow::anyhow!("API key cannot be empty"));
    }

    Ok(api_key.trim().to_string())
}

fn setup_model(provider: &str) -> Result<String> {
    let models: &[&str] = match provider {
        "ollama" => &["llama3.1", "qwen2.5", "mistral-nemo"],
        "openrouter" => &["openai/gpt-4o-mini", "openai/gpt-4o", "anthropic/claude-3.5-sonnet"],
        _ => &["gpt-4o-mini", "gpt-4o", "gpt-4.1-mini", "gpt-4.1"],
    };

    let selection = Select::new()
        .with_prompt("Select your model")
        .items(models)
        .default(0)
        .interact()
        .context("Failed to select model")?;

    Ok(models[selection].to_string())
}

fn setup_search() -> Result<SearchConfig> {
    let mut search = SearchConfig::default();

    let configure = Confirm::new()
        .with_prompt("Store Google Custom Search credentials in the config file?")
        .default(false)
        .interact()
        .context("Failed to read confirmation")?;

    if !configure {
        println!(
            "  {} search will read {} and {}",
            style("→").green(),
            style(&search.api_key_env).cyan(),
            style(&search.engine_id_env).cyan()
        );
        return Ok(search);
    }

    search.api_key = Password::new()
        .with_prompt("Google API key")
        .interact()
        .context("Failed to read search API key")?;
    search.engine_id = Input::new()
        .with_prompt("Search engine id (cx)")
        .interact_text()
        .context("Failed to read search engine id")?;

    Ok(search)
}

pub fn run_onboard() -> Result<Config> {
    println!("{}", style(BANNER).cyan().bold());

    println!("  {}", style("Welcome to stepwise!").white().bold());
    println!(
        "  {}",
        style("This wizard sets up the model and tools the workflow uses.").dim()
    );
    println!();

    print_step(1, 4, "Provider");
    let provider = setup_provider()?;
    let api_key = setup_api_key(provider)?;

    print_step(2, 4, "Model Selection");
    let model = setup_model(provider)?;

    print_step(3, 4, "Web Search");
    let search = setup_search()?;

    let config = Config {
        provider: Some(provider.to_string()),
        api_key,
        model,
        search,
        ..Default::default()
    };

    print_step(4, 4, "Prompt Templates");
    match write_default_templates(&config.workspace_dir) {
        Ok(written) => {
            println!(
                "  {} Prompt templates ready at {}",
                style("✓").green(),
                style(config.workspace_dir.display()).cyan()
            );
            for path in written {
                if let Some(name) = path.file_name() {
                    println!("  {} - {}", style("  ").dim(), name.to_string_lossy());
                }
            }
        }
        Err(e) => eprintln!(
            "  {} Warning: Could not write prompt templates: {:#}",
            style("!").yellow(),
            e
        ),
    }

    println!();
    println!("  {} Configuration complete!", style("✓").green().bold());
    println!(
        "  {} Config saved to {}",
        style("→").green(),
        style(get_config_path().display()).cyan()
    );
    println!();
    println!(
        "  {} You can now run: {}",
        style("→").green(),
        style("stepwise run \"your objective\"").cyan().bold()
    );
    println!();

    Ok(config)
}
