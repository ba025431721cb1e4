use super::*;

#[test]
fn explicit_success_phrase() {
    let summary = classify("Envio efetuado com sucesso.", "", None);

    assert_eq!(summary.state, ResponseState::Success);
    assert!(summary.success);
    assert_eq!(summary.headline_message, "Envio efetuado com sucesso.");
    assert!(summary.errors.is_empty());
    assert_eq!(summary.raw_stdout, "Envio efetuado com sucesso.");
}

#[test]
fn error_line_is_collected() {
    let summary = classify("Erro: NIF inválido", "", None);

    assert_eq!(summary.state, ResponseState::Error);
    assert!(!summary.success);
    assert_eq!(summary.errors, vec!["Erro: NIF inválido".to_string()]);
    assert_eq!(summary.headline_message, "Erro: NIF inválido");
}

#[test]
fn zero_error_count_is_not_an_error() {
    let summary = classify("Total de erros: 0", "", None);
    assert!(summary.errors.is_empty());
    assert_eq!(summary.state, ResponseState::Indeterminate);
    assert!(!summary.success);
    assert_eq!(summary.headline_message, "Total de erros: 0");

    let summary = classify("Total de erros: 0\nFicheiro enviado", "", None);
    assert!(summary.errors.is_empty());
    assert_eq!(summary.state, ResponseState::Success);
}

#[test]
fn counts_that_only_start_or_end_in_zero_are_errors() {
    for stdout in ["Erros: 03", "10 erros", "Total de erros: 03\nFicheiro enviado"] {
        let summary = classify(stdout, "", Some(0));
        assert_eq!(summary.state, ResponseState::Error, "{stdout}");
        assert_eq!(summary.errors.len(), 1, "{stdout}");
    }
}

#[test]
fn update_code_marker_requires_client_update() {
    let stdout = r#"<response code="-9">Pedido rejeitado</response>"#;
    let summary = classify(stdout, "", Some(1));

    assert_eq!(summary.state, ResponseState::ClientUpdateRequired);
    assert!(!summary.success);
    assert!(summary.requires_client_update());
    assert_eq!(summary.headline_message, "Pedido rejeitado");
    assert!(summary.errors.is_empty());
}

#[test]
fn update_phrase_overrides_success() {
    let stdout = "Processo concluído\n\
                  A aplicação necessita de atualizar o cliente de comando.\n\
                  Vai ser iniciada a obtenção do jar: java -jar \"/tmp/EnviaSaft.jar\"";
    let summary = classify(stdout, "", Some(0));

    assert_eq!(summary.state, ResponseState::ClientUpdateRequired);
    assert!(!summary.success);
    assert_eq!(
        summary.headline_message,
        "A aplicação necessita de atualizar o cliente de comando. \
         Vai ser iniciada a obtenção do jar: java -jar \"/tmp/EnviaSaft.jar\""
    );
}

#[test]
fn repeated_update_lines_are_joined_once() {
    let stdout = "<msg>Existe uma nova versão</msg>\n<msg>Existe uma nova versão</msg>";
    let summary = classify(stdout, "", None);

    assert_eq!(summary.headline_message, "Existe uma nova versão");
}

#[test]
fn update_line_without_text_uses_generic_message() {
    let summary = classify(r#"<r code="-9"/>"#, "", None);

    assert_eq!(summary.state, ResponseState::ClientUpdateRequired);
    assert_eq!(summary.headline_message, GENERIC_UPDATE_MESSAGE);
}

#[test]
fn errors_prevent_success() {
    let summary = classify(
        "Ficheiro enviado com sucesso\nErro: linha 12 inválida",
        "",
        Some(0),
    );

    assert_eq!(summary.state, ResponseState::Error);
    assert!(!summary.success);
    assert_eq!(summary.headline_message, "Erro: linha 12 inválida");
}

#[test]
fn statistics_imply_completion() {
    let summary = classify("Total de faturas: 120\nTotal de documentos: 3", "", None);

    assert_eq!(summary.state, ResponseState::Success);
    assert!(summary.success);
    assert_eq!(summary.headline_message, GENERIC_SUCCESS_MESSAGE);
}

#[test]
fn clean_exit_without_errors_is_success() {
    let summary = classify("A processar...", "", Some(0));
    assert_eq!(summary.state, ResponseState::Success);
    assert!(summary.success);
    assert_eq!(summary.headline_message, CLEAN_EXIT_MESSAGE);

    let summary = classify("", "", Some(0));
    assert_eq!(summary.state, ResponseState::Success);
    assert_eq!(summary.headline_message, CLEAN_EXIT_MESSAGE);
}

#[test]
fn success_phrases_only_count_on_stdout() {
    let summary = classify("", "enviado com sucesso", None);

    assert_eq!(summary.state, ResponseState::Error);
    assert_eq!(summary.headline_message, "enviado com sucesso");
}

#[test]
fn negated_success_is_not_success() {
    let summary = classify("O ficheiro não foi enviado", "", None);

    assert_eq!(summary.state, ResponseState::Indeterminate);
    assert!(!summary.success);
}

#[test]
fn stderr_makes_an_error() {
    let summary = classify("", "Exception in thread \"main\" java.lang.NullPointerException", Some(1));

    assert_eq!(summary.state, ResponseState::Error);
    assert!(summary.errors.is_empty());
    assert_eq!(
        summary.headline_message,
        "Exception in thread \"main\" java.lang.NullPointerException"
    );
}

#[test]
fn stderr_of_only_markup_falls_back_to_exit_code() {
    let summary = classify("", "<br/>", Some(3));

    assert_eq!(summary.state, ResponseState::Error);
    assert_eq!(
        summary.headline_message,
        "An error occurred during submission (exit code 3)."
    );
}

#[test]
fn warnings_without_errors() {
    let summary = classify("Aviso: campo TaxCountryRegion vazio\nWarning: deprecated flag", "", None);

    assert_eq!(summary.state, ResponseState::Warning);
    assert!(!summary.success);
    assert_eq!(summary.warnings.len(), 2);
    assert_eq!(summary.headline_message, "Aviso: campo TaxCountryRegion vazio");
}

#[test]
fn warnings_do_not_block_success() {
    let summary = classify("Aviso: campo vazio\nFicheiro enviado com sucesso", "", None);

    assert_eq!(summary.state, ResponseState::Success);
    assert_eq!(summary.warnings, vec!["Aviso: campo vazio".to_string()]);
    assert_eq!(summary.headline_message, "Ficheiro enviado com sucesso");
}

#[test]
fn no_output_is_indeterminate() {
    let summary = classify("", "  \n\r\n", None);

    assert_eq!(summary.state, ResponseState::Indeterminate);
    assert!(!summary.success);
    assert_eq!(summary.headline_message, NO_OUTPUT_MESSAGE);
}

#[test]
fn codes_are_collected_in_order_without_duplicates() {
    let stdout = "Erro AT1234: NIF inválido\nErro AT1234 repetido\nDetalhe PT50001 e at98765";
    let summary = classify(stdout, "Erro XY123", None);

    assert_eq!(summary.codes, vec!["AT1234", "PT50001", "at98765", "XY123"]);
}

#[test]
fn markup_is_removed_from_collected_lines() {
    let summary = classify("<erro><b>Erro:</b> data inválida</erro>", "", None);

    assert_eq!(summary.errors, vec!["Erro: data inválida".to_string()]);
}

#[test]
fn carriage_returns_split_lines() {
    let summary = classify("Erro: primeiro\rErro: segundo", "", None);

    assert_eq!(summary.errors.len(), 2);
}

#[test]
fn identical_inputs_give_identical_summaries() {
    let stdout = "Aviso: x\nErro AT0001: y";
    assert_eq!(classify(stdout, "z", Some(2)), classify(stdout, "z", Some(2)));
}
