pub mod cli_completion_sink;
